//! Durable subscription records.
//!
//! One JSON file per subscription, named after its id:
//! ```text
//! {directory}/
//! ├── 3f2b9c0e8a6d4f1e9b7c5a3d2e1f0a9b.json
//! └── 8c1d2e3f4a5b6c7d8e9f0a1b2c3d4e5f.json
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{FeedwatchError, Result};
use crate::subscription::types::Subscription;

const RECORD_EXTENSION: &str = "json";

/// File-backed subscription store.
#[derive(Debug, Clone)]
pub struct SubscriptionStore {
    directory: PathBuf,
}

impl SubscriptionStore {
    /// Open the store, creating the directory if it doesn't exist.
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;

        Ok(Self { directory })
    }

    /// Directory holding the records.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Load every record in the store.
    ///
    /// Records that cannot be read or parsed are skipped and logged; only an
    /// unreadable directory is an error.
    pub fn load_all(&self) -> Result<Vec<Subscription>> {
        let mut subscriptions = Vec::new();

        for entry in fs::read_dir(&self.directory)? {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    warn!("Failed to read store entry: {}", e);
                    continue;
                }
            };

            if path.extension().and_then(|ext| ext.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }

            match read_record(&path) {
                Ok(subscription) => subscriptions.push(subscription),
                Err(e) => warn!("Skipping unreadable record {}: {}", path.display(), e),
            }
        }

        debug!(
            "Loaded {} subscription(s) from {}",
            subscriptions.len(),
            self.directory.display()
        );
        Ok(subscriptions)
    }

    /// Load a single record.
    pub fn load(&self, id: &str) -> Result<Subscription> {
        let path = self.record_path(id)?;
        match read_record(&path) {
            Err(FeedwatchError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                Err(FeedwatchError::NotFound(format!("subscription {id}")))
            }
            other => other,
        }
    }

    /// Write a record, replacing any previous version.
    ///
    /// The record is written to a temporary file and renamed into place so a
    /// crash never leaves a torn record behind.
    pub fn save(&self, subscription: &Subscription) -> Result<()> {
        let path = self.record_path(&subscription.id)?;
        let tmp_path = path.with_extension("json.tmp");

        let content = serde_json::to_vec_pretty(subscription)?;
        fs::write(&tmp_path, content).map_err(|e| {
            FeedwatchError::Persistence(format!("failed to write {}: {}", tmp_path.display(), e))
        })?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            FeedwatchError::Persistence(format!("failed to replace {}: {}", path.display(), e))
        })?;

        Ok(())
    }

    /// Delete a record.
    ///
    /// Returns `true` if the record was deleted, `false` if it didn't exist.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let path = self.record_path(id)?;

        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(FeedwatchError::Persistence(format!(
                "failed to delete {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Check if a record exists.
    pub fn exists(&self, id: &str) -> bool {
        self.record_path(id).map(|path| path.exists()).unwrap_or(false)
    }

    fn record_path(&self, id: &str) -> Result<PathBuf> {
        if !is_valid_id(id) {
            return Err(FeedwatchError::Persistence(format!(
                "invalid subscription id: {id:?}"
            )));
        }
        Ok(self.directory.join(format!("{id}.{RECORD_EXTENSION}")))
    }
}

fn read_record(path: &Path) -> Result<Subscription> {
    let content = fs::read(path)?;
    Ok(serde_json::from_slice(&content)?)
}

/// Ids become file names, so only plain identifier characters are allowed.
fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
