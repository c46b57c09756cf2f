use std::path::PathBuf;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::MediaError;
use crate::path::parse_object_path;

/// On-disk object storage.
///
/// Each object lives at `{storage_dir}/{object_path}`; the object path is
/// validated before it touches the filesystem, so it cannot escape the root.
pub struct ObjectStorage {
    dir: PathBuf,
}

impl ObjectStorage {
    pub async fn new(dir: PathBuf) -> Result<Self, MediaError> {
        fs::create_dir_all(&dir).await?;
        info!("Object storage directory: {}", dir.display());
        Ok(Self { dir })
    }

    /// Filesystem location of an object.
    pub fn file_path(&self, object_path: &str) -> Result<PathBuf, MediaError> {
        parse_object_path(object_path)?;
        Ok(self.dir.join(object_path))
    }

    /// Write a new object. Existing objects are never overwritten.
    /// Returns the number of bytes written.
    pub async fn put(&self, object_path: &str, data: &[u8]) -> Result<u64, MediaError> {
        let path = self.file_path(object_path)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => MediaError::AlreadyExists(object_path.to_string()),
                _ => e.into(),
            })?;
        file.write_all(data).await?;
        file.flush().await?;

        debug!("Stored {} bytes at {}", data.len(), object_path);
        Ok(data.len() as u64)
    }

    /// Read a whole object.
    pub async fn read(&self, object_path: &str) -> Result<Vec<u8>, MediaError> {
        let path = self.file_path(object_path)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(MediaError::NotFound(object_path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, object_path: &str) -> Result<bool, MediaError> {
        let path = self.file_path(object_path)?;
        Ok(fs::try_exists(&path).await?)
    }
}
