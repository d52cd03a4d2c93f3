//! Filesystem blob store for document content.
//!
//! Blobs are flat files named `<key>.pdf` under one root. Writes go to a `.part`
//! sibling first and are renamed into place only after the full stream has been
//! copied and synced, so a crashed or failed write never leaves a readable blob.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use super::ContentReader;

#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

/// Keys are generated ids; anything that could escape the root is rejected.
fn valid_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= 128
        && !key.starts_with('.')
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && !key.contains("..")
}

impl FsBlobStore {
    pub fn new<P: AsRef<Path>>(root: P) -> io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path { &self.root }

    fn path_for(&self, content_ref: &str) -> io::Result<PathBuf> {
        if !valid_key(content_ref) {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, format!("invalid blob key '{content_ref}'")));
        }
        Ok(self.root.join(content_ref))
    }

    /// Copy `content` into a new blob for `id`. Returns the content reference and the
    /// number of bytes written.
    pub async fn write(&self, id: &str, mut content: ContentReader) -> io::Result<(String, u64)> {
        let content_ref = format!("{id}.pdf");
        let final_path = self.path_for(&content_ref)?;
        let part_path = self.root.join(format!("{content_ref}.part"));

        let res: io::Result<u64> = async {
            let mut file = fs::File::create(&part_path).await?;
            let n = tokio::io::copy(&mut content, &mut file).await?;
            file.flush().await?;
            file.sync_all().await?;
            Ok(n)
        }
        .await;

        match res {
            Ok(n) => {
                if let Err(e) = fs::rename(&part_path, &final_path).await {
                    let _ = fs::remove_file(&part_path).await;
                    return Err(e);
                }
                debug!(target: "docportal::storage", "blob: wrote {} bytes to '{}'", n, final_path.display());
                Ok((content_ref, n))
            }
            Err(e) => {
                let _ = fs::remove_file(&part_path).await;
                Err(e)
            }
        }
    }

    /// `Ok(None)` when the blob does not exist.
    pub async fn open(&self, content_ref: &str) -> io::Result<Option<ContentReader>> {
        let path = self.path_for(content_ref)?;
        match fs::File::open(&path).await {
            Ok(f) => Ok(Some(Box::new(f))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn remove(&self, content_ref: &str) -> io::Result<()> {
        let path = self.path_for(content_ref)?;
        fs::remove_file(&path).await
    }

    /// Remove a blob, logging instead of failing. Used on rollback and delete paths.
    pub async fn remove_logged(&self, content_ref: &str) {
        if let Err(e) = self.remove(content_ref).await {
            warn!(target: "docportal::storage", "blob: failed to remove '{}': {}", content_ref, e);
        }
    }
}
