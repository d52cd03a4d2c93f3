//! Runs against a real database only when DOCPORTAL_TEST_DATABASE_URL is set;
//! otherwise every test returns early.

use std::io::Cursor;

use tokio::io::AsyncReadExt;

use docportal::model::{NewDocument, NewUser, Role, UserPatch};
use docportal::storage::blob::FsBlobStore;
use docportal::storage::{ContentReader, PgStorage, PortalStorage, StorageError};

async fn connect(tmp: &tempfile::TempDir) -> Option<PgStorage> {
    let url = std::env::var("DOCPORTAL_TEST_DATABASE_URL").ok()?;
    let blobs = FsBlobStore::new(tmp.path().join("blobs")).unwrap();
    Some(PgStorage::connect(&url, blobs).await.expect("connect to DOCPORTAL_TEST_DATABASE_URL"))
}

// Tables persist between runs, so every test uses fresh phone numbers.
fn fresh_phone() -> String {
    let n = uuid::Uuid::new_v4().as_u128() % 10_000_000;
    format!("+1555{n:07}")
}

fn user(phone: &str, role: Role) -> NewUser {
    NewUser { phone_number: phone.into(), password: "secret12".into(), role, name: None }
}

fn reader(bytes: &[u8]) -> ContentReader { Box::new(Cursor::new(bytes.to_vec())) }

#[tokio::test]
async fn phone_is_unique_across_admins_and_clients() {
    let tmp = tempfile::tempdir().unwrap();
    let Some(pg) = connect(&tmp).await else { return };
    let phone = fresh_phone();

    let admin = pg.create_user(user(&phone, Role::Admin)).await.unwrap();
    assert!(matches!(pg.create_user(user(&phone, Role::Client)).await, Err(StorageError::Conflict(_))));

    assert_eq!(pg.get_user_by_phone_number(&phone).await.unwrap().unwrap().role, Role::Admin);
    assert!(pg.verify_password(&phone, "secret12").await.unwrap().is_some());
    assert!(pg.verify_password(&phone, "nope").await.unwrap().is_none());

    let other = pg.create_user(user(&fresh_phone(), Role::Client)).await.unwrap();
    let clash = pg.update_user(&admin.id, UserPatch { phone_number: Some(other.phone_number.clone()), ..Default::default() }).await;
    assert!(matches!(clash, Err(StorageError::Conflict(_))));

    let renamed = pg
        .update_user(&admin.id, UserPatch { name: Some("Boss".into()), ..Default::default() })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(renamed.name.as_deref(), Some("Boss"));
    assert_eq!(renamed.phone_number, phone);
}

#[tokio::test]
async fn documents_round_trip_and_delete() {
    let tmp = tempfile::tempdir().unwrap();
    let Some(pg) = connect(&tmp).await else { return };
    let phone = fresh_phone();
    let bytes = b"%PDF-1.4\nround trip\n%%EOF".to_vec();

    let doc = pg
        .create_document(NewDocument::pdf("a.pdf", &phone, bytes.len() as u64, "admin"), reader(&bytes))
        .await
        .unwrap();
    let mut out = Vec::new();
    pg.get_document_stream(&doc.content_ref).await.unwrap().unwrap().read_to_end(&mut out).await.unwrap();
    assert_eq!(out, bytes);

    let second = pg
        .create_document(NewDocument::pdf("b.pdf", &phone, bytes.len() as u64, "admin"), reader(&bytes))
        .await
        .unwrap();
    let listed = pg.get_documents_by_client(&phone).await.unwrap();
    assert_eq!(listed.iter().map(|d| d.id.as_str()).collect::<Vec<_>>(), vec![second.id.as_str(), doc.id.as_str()]);

    assert!(pg.delete_document(&doc.id).await.unwrap());
    assert!(pg.get_document(&doc.id).await.unwrap().is_none());
    assert!(pg.get_document_stream(&doc.content_ref).await.unwrap().is_none());
    assert!(!pg.get_all_documents().await.unwrap().iter().any(|d| d.id == doc.id));
    assert!(!pg.delete_document(&doc.id).await.unwrap());
}

#[tokio::test]
async fn size_mismatch_leaves_nothing_behind() {
    let tmp = tempfile::tempdir().unwrap();
    let Some(pg) = connect(&tmp).await else { return };
    let phone = fresh_phone();

    let res = pg.create_document(NewDocument::pdf("short.pdf", &phone, 999, "admin"), reader(b"%PDF-1.4")).await;
    assert!(matches!(res, Err(StorageError::Integrity(_))));
    assert!(pg.get_documents_by_client(&phone).await.unwrap().is_empty());
    assert_eq!(std::fs::read_dir(pg.blobs().root()).unwrap().count(), 0);
}

#[tokio::test]
async fn reads_run_alongside_user_writes() {
    let tmp = tempfile::tempdir().unwrap();
    let Some(pg) = connect(&tmp).await else { return };
    let phones: Vec<String> = (0..4).map(|_| fresh_phone()).collect();

    let writes = futures::future::join_all(phones.iter().map(|p| pg.create_user(user(p, Role::Client))));
    let reads = futures::future::join_all((0..8).map(|_| pg.get_all_documents()));
    let (written, read) = tokio::join!(writes, reads);

    assert!(written.iter().all(|r| r.is_ok()));
    assert!(read.iter().all(|r| r.is_ok()));
    for p in &phones {
        assert!(pg.get_user_by_phone_number(p).await.unwrap().is_some());
    }
}
