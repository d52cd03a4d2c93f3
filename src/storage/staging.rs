//! Staging area for incoming uploads.
//!
//! Every uploaded file is streamed into its own temp file before validation. The
//! `StagedFile` guard owns that temp file: it is removed by `discard`, or on drop if
//! the request ends early (error, dropped connection). Leftovers from a crash are
//! swept by age.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::fs;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};
use uuid::Uuid;

const STAGED_SUFFIX: &str = ".upload";

/// Keep only characters safe in a file name; the original name is kept separately.
fn sanitize_component(s: &str) -> String {
    let mut out = String::with_capacity(s.len().min(64));
    for c in s.chars() {
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            out.push(c);
        } else if c == '.' && !out.ends_with('.') {
            out.push(c);
        }
        if out.len() >= 64 { break; }
    }
    out.trim_matches('.').to_string()
}

#[derive(Debug, Clone)]
pub struct StagingArea {
    dir: PathBuf,
}

impl StagingArea {
    pub fn new<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path { &self.dir }

    /// Create an empty staged file and the handle to write it.
    pub async fn create(&self, original_name: &str, declared_type: Option<String>) -> io::Result<(StagedFile, fs::File)> {
        let name = format!("{}-{}{}", Uuid::new_v4(), sanitize_component(original_name), STAGED_SUFFIX);
        let path = self.dir.join(name);
        let file = fs::File::create(&path).await?;
        debug!(target: "docportal::ingest", "staged '{}' at '{}'", original_name, path.display());
        let staged = StagedFile {
            path,
            original_name: original_name.to_string(),
            declared_type,
            size: 0,
            removed: false,
        };
        Ok((staged, file))
    }

    /// Staged files currently on disk.
    pub fn pending(&self) -> usize {
        std::fs::read_dir(&self.dir)
            .map(|rd| {
                rd.flatten()
                    .filter(|e| e.file_name().to_string_lossy().ends_with(STAGED_SUFFIX))
                    .count()
            })
            .unwrap_or(0)
    }

    /// Remove staged files older than `max_age`. Returns how many were removed.
    pub fn sweep_stale(&self, max_age: Duration) -> usize {
        let Ok(rd) = std::fs::read_dir(&self.dir) else { return 0 };
        let now = SystemTime::now();
        let mut removed = 0usize;
        for entry in rd.flatten() {
            if !entry.file_name().to_string_lossy().ends_with(STAGED_SUFFIX) { continue; }
            let Ok(meta) = entry.metadata() else { continue };
            let Ok(modified) = meta.modified() else { continue };
            let age = now.duration_since(modified).unwrap_or_default();
            if age > max_age {
                match std::fs::remove_file(entry.path()) {
                    Ok(()) => removed += 1,
                    Err(e) => warn!(target: "docportal::ingest", "failed to sweep '{}': {}", entry.path().display(), e),
                }
            }
        }
        removed
    }
}

/// Owned temp file for one uploaded part.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    original_name: String,
    declared_type: Option<String>,
    size: u64,
    removed: bool,
}

impl StagedFile {
    pub fn path(&self) -> &Path { &self.path }
    pub fn original_name(&self) -> &str { &self.original_name }
    pub fn declared_type(&self) -> Option<&str> { self.declared_type.as_deref() }
    pub fn size(&self) -> u64 { self.size }
    pub fn set_size(&mut self, size: u64) { self.size = size; }

    /// First `n` bytes of the staged content (fewer if the file is shorter).
    pub async fn head(&self, n: usize) -> io::Result<Vec<u8>> {
        let file = fs::File::open(&self.path).await?;
        let mut buf = Vec::with_capacity(n);
        file.take(n as u64).read_to_end(&mut buf).await?;
        Ok(buf)
    }

    /// Remove the temp file now. Never fails; problems are logged.
    pub async fn discard(mut self) {
        self.removed = true;
        match fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(target: "docportal::ingest", "failed to remove staged file '{}': {}", self.path.display(), e),
        }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.removed { return; }
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(target: "docportal::ingest", "failed to remove staged file '{}' on drop: {}", self.path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn sanitizes_names() {
        assert_eq!(sanitize_component("../../etc/passwd"), "etcpasswd");
        assert_eq!(sanitize_component("Q1 report (final).pdf"), "Q1reportfinal.pdf");
        assert_eq!(sanitize_component("..."), "");
    }

    #[tokio::test]
    async fn discard_and_drop_remove_the_file() {
        let tmp = tempfile::tempdir().unwrap();
        let area = StagingArea::new(tmp.path().join("staging")).unwrap();

        let (staged, mut f) = area.create("a.pdf", Some("application/pdf".into())).await.unwrap();
        f.write_all(b"%PDF-1.4").await.unwrap();
        drop(f);
        assert_eq!(area.pending(), 1);
        assert_eq!(staged.head(5).await.unwrap(), b"%PDF-");
        staged.discard().await;
        assert_eq!(area.pending(), 0);

        {
            let (_staged, _f) = area.create("b.pdf", None).await.unwrap();
            assert_eq!(area.pending(), 1);
        }
        assert_eq!(area.pending(), 0);
    }

    #[tokio::test]
    async fn sweep_only_removes_old_files() {
        let tmp = tempfile::tempdir().unwrap();
        let area = StagingArea::new(tmp.path()).unwrap();
        std::fs::write(tmp.path().join("leftover.upload"), b"x").unwrap();
        std::fs::write(tmp.path().join("unrelated.txt"), b"x").unwrap();

        assert_eq!(area.sweep_stale(Duration::from_secs(3600)), 0);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(area.sweep_stale(Duration::from_millis(1)), 1);
        assert!(tmp.path().join("unrelated.txt").exists());
    }
}
