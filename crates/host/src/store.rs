//! On-disk artifact store rooted at a fixed directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use converge::{ArtifactPath, ArtifactStore, ProvisioningError};

/// Production artifact store. Paths resolve relative to `root`.
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &ArtifactPath) -> PathBuf {
        self.root.join(path.as_str())
    }
}

fn write_error(path: &ArtifactPath, source: std::io::Error) -> ProvisioningError {
    ProvisioningError::ArtifactWrite {
        path: path.as_str().to_string(),
        source,
    }
}

#[cfg(unix)]
async fn create_secret(target: &Path, content: &str) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    // The 0600 mode is applied at open time, before any content lands, so
    // the file is never observable with wider access.
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(target)
        .await?;
    file.write_all(content.as_bytes()).await?;
    file.flush().await
}

#[cfg(not(unix))]
async fn create_secret(target: &Path, content: &str) -> std::io::Result<()> {
    // This platform has no POSIX permission bits; the file is written with
    // default access and the gap is surfaced to the operator.
    tracing::warn!(
        path = %target.display(),
        "owner-only permissions are not supported on this platform; secret written with default access"
    );
    tokio::fs::write(target, content).await
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn exists(&self, path: &ArtifactPath) -> bool {
        tokio::fs::metadata(self.resolve(path))
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    }

    async fn read(&self, path: &ArtifactPath) -> Result<String, ProvisioningError> {
        tokio::fs::read_to_string(self.resolve(path))
            .await
            .map_err(|source| ProvisioningError::ArtifactRead {
                path: path.as_str().to_string(),
                source,
            })
    }

    async fn write(&self, path: &ArtifactPath, content: &str) -> Result<(), ProvisioningError> {
        tokio::fs::write(self.resolve(path), content)
            .await
            .map_err(|source| write_error(path, source))
    }

    async fn write_secret(
        &self,
        path: &ArtifactPath,
        content: &str,
    ) -> Result<(), ProvisioningError> {
        create_secret(&self.resolve(path), content)
            .await
            .map_err(|source| write_error(path, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TempRoot {
        path: PathBuf,
    }

    impl TempRoot {
        fn new() -> Self {
            let path =
                std::env::temp_dir().join(format!("gatewright-store-{}", uuid::Uuid::new_v4()));
            std::fs::create_dir_all(&path).unwrap();
            Self { path }
        }
    }

    impl Drop for TempRoot {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.path);
        }
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let root = TempRoot::new();
        let store = LocalArtifactStore::new(&root.path);
        let path = ArtifactPath::from("gateway.yml");

        assert!(!store.exists(&path).await);
        store.write(&path, "log:\n  level: info\n").await.unwrap();
        assert!(store.exists(&path).await);
        assert_eq!(store.read(&path).await.unwrap(), "log:\n  level: info\n");
    }

    #[tokio::test]
    async fn reading_a_missing_artifact_fails() {
        let root = TempRoot::new();
        let store = LocalArtifactStore::new(&root.path);
        let err = store.read(&ArtifactPath::from("absent.yml")).await.unwrap_err();
        assert!(matches!(err, ProvisioningError::ArtifactRead { .. }));
    }

    #[tokio::test]
    async fn directories_do_not_count_as_artifacts() {
        let root = TempRoot::new();
        std::fs::create_dir(root.path.join("subdir")).unwrap();
        let store = LocalArtifactStore::new(&root.path);
        assert!(!store.exists(&ArtifactPath::from("subdir")).await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn secrets_are_owner_only_from_creation() {
        use std::os::unix::fs::PermissionsExt;

        let root = TempRoot::new();
        let store = LocalArtifactStore::new(&root.path);
        let path = ArtifactPath::from("tls-store.json");
        store.write_secret(&path, "").await.unwrap();

        let mode = std::fs::metadata(root.path.join("tls-store.json"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
