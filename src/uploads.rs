use chrono::Utc;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};
use uuid::Uuid;

use crate::error::Result;

/// URL prefix under which stored uploads are served.
pub const PUBLIC_PREFIX: &str = "/uploads";

/// Uploaded material files, kept flat in one directory.
#[derive(Clone, Debug)]
pub struct Uploads {
    dir: PathBuf,
}

impl Uploads {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Writes the bytes under a fresh name and returns the public path
    /// (`/uploads/<name>`) to record on the material.
    pub async fn store(&self, original_name: Option<&str>, bytes: &[u8]) -> Result<String> {
        self.ensure_dir().await?;
        let name = stored_name(original_name);
        tokio::fs::write(self.dir.join(&name), bytes).await?;
        tracing::info!(file=%name, size=bytes.len(), "stored upload");
        Ok(format!("{PUBLIC_PREFIX}/{name}"))
    }

    /// Removes the file behind a recorded public path. Missing files are
    /// ignored and other failures only logged.
    pub async fn remove(&self, public_path: &str) {
        let Some(target) = self.resolve(public_path) else {
            tracing::warn!(path=%public_path, "ignoring file path outside the upload dir");
            return;
        };
        match tokio::fs::remove_file(&target).await {
            Ok(()) => tracing::info!(file=%target.display(), "removed upload"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::error!(error=%e, file=%target.display(), "failed to remove upload"),
        }
    }

    // only the final component is trusted, so a record can never point elsewhere
    fn resolve(&self, public_path: &str) -> Option<PathBuf> {
        let rest = public_path.strip_prefix(PUBLIC_PREFIX)?.strip_prefix('/')?;
        if rest.is_empty() || rest.contains(['/', '\\']) || rest == ".." || rest == "." {
            return None;
        }
        Some(self.dir.join(rest))
    }
}

/// `<unix millis>-<random>` plus the original extension, if it is a plain one.
fn stored_name(original_name: Option<&str>) -> String {
    let suffix = Uuid::new_v4().as_u128() % 1_000_000_000;
    let ext = original_name
        .and_then(|n| Path::new(n).extension())
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 16 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default();
    format!("{}-{}{}", Utc::now().timestamp_millis(), suffix, ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn stored_name_keeps_simple_extension() {
        assert!(stored_name(Some("Week 1 Notes.PDF")).ends_with(".pdf"));
        assert!(!stored_name(Some("archive.tar.g z")).contains(' '));
        assert!(!stored_name(None).contains('.'));
        assert_ne!(stored_name(Some("a.txt")), stored_name(Some("a.txt")));
    }

    #[test]
    fn resolve_rejects_paths_outside_upload_dir() {
        let uploads = Uploads::new("/srv/uploads");
        assert_eq!(
            uploads.resolve("/uploads/1-2.pdf"),
            Some(PathBuf::from("/srv/uploads/1-2.pdf"))
        );
        assert_eq!(uploads.resolve("/uploads/../database.json"), None);
        assert_eq!(uploads.resolve("/etc/passwd"), None);
        assert_eq!(uploads.resolve("/uploads/"), None);
    }

    #[tokio::test]
    async fn store_then_remove() {
        let dir = TempDir::new().unwrap();
        let uploads = Uploads::new(dir.path().join("uploads"));
        let public = uploads.store(Some("slides.pptx"), b"deck").await.unwrap();
        assert!(public.starts_with("/uploads/"));
        let on_disk = uploads.resolve(&public).unwrap();
        assert_eq!(std::fs::read(&on_disk).unwrap(), b"deck");

        uploads.remove(&public).await;
        assert!(!on_disk.exists());
        // second removal is a quiet no-op
        uploads.remove(&public).await;
    }
}
