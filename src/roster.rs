//! Client roster: registered clients merged with phone numbers that only appear on
//! documents.

use std::collections::HashMap;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::model::{Document, Role, User};
use crate::storage::{PortalStorage, StorageResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterEntry {
    Registered {
        id: String,
        phone_number: String,
        name: Option<String>,
        role: Role,
        document_count: usize,
    },
    /// Documents filed under a phone number with no account.
    Unregistered {
        phone_number: String,
        document_count: usize,
    },
}

impl RosterEntry {
    pub fn phone_number(&self) -> &str {
        match self {
            RosterEntry::Registered { phone_number, .. } | RosterEntry::Unregistered { phone_number, .. } => phone_number,
        }
    }

    /// Account id, or the phone number standing in for one.
    pub fn key(&self) -> &str {
        match self {
            RosterEntry::Registered { id, .. } => id,
            RosterEntry::Unregistered { phone_number, .. } => phone_number,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            RosterEntry::Registered { name, .. } => name.as_deref(),
            RosterEntry::Unregistered { .. } => None,
        }
    }

    pub fn document_count(&self) -> usize {
        match self {
            RosterEntry::Registered { document_count, .. } | RosterEntry::Unregistered { document_count, .. } => *document_count,
        }
    }

    pub fn is_registered(&self) -> bool { matches!(self, RosterEntry::Registered { .. }) }

    fn bump(&mut self) {
        match self {
            RosterEntry::Registered { document_count, .. } | RosterEntry::Unregistered { document_count, .. } => *document_count += 1,
        }
    }
}

// Wire shape: {id, phoneNumber, name?, role?, documentCount, registered}
impl Serialize for RosterEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("id", self.key())?;
        map.serialize_entry("phoneNumber", self.phone_number())?;
        if let RosterEntry::Registered { name, role, .. } = self {
            if let Some(n) = name {
                map.serialize_entry("name", n)?;
            }
            map.serialize_entry("role", role)?;
        }
        map.serialize_entry("documentCount", &self.document_count())?;
        map.serialize_entry("registered", &self.is_registered())?;
        map.end()
    }
}

/// Registered clients first in the given order, then unregistered phones in the order
/// their first document appears.
pub fn aggregate(clients: &[User], documents: &[Document]) -> Vec<RosterEntry> {
    let mut entries: Vec<RosterEntry> = Vec::with_capacity(clients.len());
    let mut by_phone: HashMap<String, usize> = HashMap::with_capacity(clients.len());

    for u in clients {
        if by_phone.contains_key(&u.phone_number) { continue; }
        by_phone.insert(u.phone_number.clone(), entries.len());
        entries.push(RosterEntry::Registered {
            id: u.id.clone(),
            phone_number: u.phone_number.clone(),
            name: u.name.clone(),
            role: u.role,
            document_count: 0,
        });
    }

    for d in documents {
        match by_phone.get(&d.client_phone_number) {
            Some(&idx) => entries[idx].bump(),
            None => {
                by_phone.insert(d.client_phone_number.clone(), entries.len());
                entries.push(RosterEntry::Unregistered {
                    phone_number: d.client_phone_number.clone(),
                    document_count: 1,
                });
            }
        }
    }
    entries
}

pub async fn build_roster(storage: &dyn PortalStorage) -> StorageResult<Vec<RosterEntry>> {
    let clients = storage.get_all_clients().await?;
    let documents = storage.get_all_documents().await?;
    Ok(aggregate(&clients, &documents))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn user(id: &str, phone: &str, name: Option<&str>) -> User {
        User {
            id: id.into(),
            phone_number: phone.into(),
            password_hash: String::new(),
            name: name.map(str::to_string),
            role: Role::Client,
            created_at: Utc::now(),
        }
    }

    fn doc(n: i64, phone: &str) -> Document {
        Document {
            id: format!("d{n}"),
            file_name: format!("f{n}.pdf"),
            client_phone_number: phone.into(),
            upload_date: Utc::now() - Duration::seconds(n),
            file_size: 1,
            content_type: "application/pdf".into(),
            content_ref: format!("mem:{n}"),
            uploaded_by: "admin".into(),
        }
    }

    #[test]
    fn counts_registered_and_orphaned_phones() {
        let clients = vec![user("c1", "+15550000001", Some("Ada")), user("c2", "+15550000002", None)];
        let docs = vec![
            doc(1, "+15550000001"),
            doc(2, "+15559999999"),
            doc(3, "+15550000001"),
            doc(4, "+15550000001"),
        ];
        let roster = aggregate(&clients, &docs);
        assert_eq!(roster.len(), 3);
        let counts: Vec<usize> = roster.iter().map(RosterEntry::document_count).collect();
        assert_eq!(counts, vec![3, 0, 1]);
        assert_eq!(roster[2].name(), None);
        assert!(!roster[2].is_registered());
        assert_eq!(roster[2].key(), "+15559999999");
        assert_eq!(roster[0].name(), Some("Ada"));
    }

    #[test]
    fn serializes_both_shapes() {
        let roster = aggregate(&[user("c1", "+15550000001", Some("Ada"))], &[doc(1, "bad-phone")]);
        let v = serde_json::to_value(&roster).unwrap();
        assert_eq!(v[0]["id"], "c1");
        assert_eq!(v[0]["name"], "Ada");
        assert_eq!(v[0]["role"], "client");
        assert_eq!(v[0]["registered"], true);
        assert_eq!(v[1]["id"], "bad-phone");
        assert_eq!(v[1]["documentCount"], 1);
        assert!(v[1].get("name").is_none());
        assert!(v[1].get("role").is_none());
    }

    #[test]
    fn empty_inputs() {
        assert!(aggregate(&[], &[]).is_empty());
    }
}
