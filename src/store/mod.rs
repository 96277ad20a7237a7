//! Storage Module
//!
//! File-backed persistence for serialized documents: atomic writes,
//! timestamped backups, and default store locations.
//! Store location: ~/.hopvault on macOS/Linux, %APPDATA%\HopVault on Windows

use std::path::PathBuf;

use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Underlying file/database unreachable or unusable. Surfaced to the
/// caller; never silently retried.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to determine store directory")]
    NoStoreDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Watch error: {0}")]
    Watch(String),
}

/// Get the HopVault store directory
/// Returns %APPDATA%\HopVault on Windows, ~/.hopvault on macOS/Linux
pub fn store_dir() -> Result<PathBuf, StoreError> {
    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            return Ok(app_data.join("HopVault"));
        }
        dirs::home_dir()
            .map(|home| home.join(".hopvault"))
            .ok_or(StoreError::NoStoreDir)
    }

    #[cfg(not(windows))]
    {
        dirs::home_dir()
            .map(|home| home.join(".hopvault"))
            .ok_or(StoreError::NoStoreDir)
    }
}

/// Default path of the serialized connections document.
pub fn connections_file() -> Result<PathBuf, StoreError> {
    Ok(store_dir()?.join("connections.json"))
}

/// Loads and saves one serialized document, format-agnostic: codecs decide
/// what the bytes mean.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Store at the default connections file location.
    pub fn new() -> Result<Self, StoreError> {
        Ok(Self {
            path: connections_file()?,
        })
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path).await.is_ok()
    }

    async fn ensure_dir(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Load the document. `Ok(None)` when no file exists yet.
    pub async fn load(&self) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    /// Save the document: backup any existing file, then write to a temp
    /// file and rename (atomic write).
    pub async fn save(&self, contents: &str) -> Result<(), StoreError> {
        self.ensure_dir().await?;

        if self.exists().await {
            let backup_path = self.backup().await?;
            tracing::debug!(?backup_path, "Backed up previous document");
        }

        let temp_path = self.path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(contents.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }

    /// Copy the current file to a UTC-timestamped backup next to it.
    pub async fn backup(&self) -> Result<PathBuf, StoreError> {
        let backup_path = self.path.with_extension(format!(
            "backup.{}",
            chrono::Utc::now().format("%Y%m%d_%H%M%S")
        ));
        if self.exists().await {
            fs::copy(&self.path, &backup_path).await?;
        }
        Ok(backup_path)
    }
}
