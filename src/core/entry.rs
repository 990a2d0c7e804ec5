//! Persisted account entry.
//! Holds the credentials, the rotating access token and the device metadata between runs.
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::models::{MeterMetadata, SectionId};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Entry file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Entry file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub login: String,
    pub password: String,
    pub token: String,
    pub section_id: SectionId,
    #[serde(default)]
    pub meter: MeterMetadata,
}

impl ConfigEntry {
    /// `true` when the entry was created with other credentials.
    pub fn credentials_differ(&self, login: &str, password: &str) -> bool {
        self.login != login || self.password != password
    }
}

/// JSON file storing one `ConfigEntry`.
#[derive(Debug, Clone)]
pub struct EntryFile {
    path: PathBuf,
}

impl EntryFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        EntryFile { path: path.into() }
    }

    /// Entry file inside the data directory.
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join("entry.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the entry, `None` if the file does not exist yet.
    pub async fn load(&self) -> Result<Option<ConfigEntry>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn save(&self, entry: &ConfigEntry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(entry)?;
        tokio::fs::write(&self.path, content).await?;
        log::debug!("Saved entry to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> ConfigEntry {
        ConfigEntry {
            login: "me@example.com".into(),
            password: "secret".into(),
            token: "token".into(),
            section_id: SectionId::new("123"),
            meter: MeterMetadata {
                manufacturer: Some("Itron".into()),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = EntryFile::in_dir(dir.path());
        assert_eq!(file.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let file = EntryFile::in_dir(&dir.path().join("sub"));

        file.save(&entry()).await.unwrap();

        assert_eq!(file.load().await.unwrap(), Some(entry()));
    }

    #[tokio::test]
    async fn test_load_corrupted_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = EntryFile::in_dir(dir.path());
        tokio::fs::write(file.path(), "not json").await.unwrap();
        assert!(matches!(file.load().await, Err(Error::Json(_))));
    }

    #[test]
    fn test_credentials_differ() {
        let entry = entry();
        assert!(!entry.credentials_differ("me@example.com", "secret"));
        assert!(entry.credentials_differ("me@example.com", "other"));
        assert!(entry.credentials_differ("you@example.com", "secret"));
    }
}
