//! Core configuration
//!
//! Settings for the message store and the dedup filter. Transport and runtime
//! settings live in their own crates.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ----------------------------------------------------------------------------
// Store Configuration
// ----------------------------------------------------------------------------

/// Location of the persisted message log and attachments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory for all persisted state
    pub data_dir: PathBuf,
    /// Record file name inside `data_dir`
    pub messages_file: String,
    /// Attachment directory name inside `data_dir`
    pub images_dir: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("WCWI"),
            messages_file: "messages.json".to_string(),
            images_dir: "images".to_string(),
        }
    }
}

impl StoreConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_messages_file(mut self, name: impl Into<String>) -> Self {
        self.messages_file = name.into();
        self
    }

    pub fn with_images_dir(mut self, name: impl Into<String>) -> Self {
        self.images_dir = name.into();
        self
    }

    pub fn messages_path(&self) -> PathBuf {
        self.data_dir.join(&self.messages_file)
    }

    pub fn images_path(&self) -> PathBuf {
        self.data_dir.join(&self.images_dir)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

// ----------------------------------------------------------------------------
// Dedup Configuration
// ----------------------------------------------------------------------------

/// Default number of remembered message ids
pub const DEFAULT_DEDUP_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Ids kept before the oldest is evicted
    pub capacity: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_DEDUP_CAPACITY,
        }
    }
}

impl DedupConfig {
    pub fn new(capacity: usize) -> Self {
        Self { capacity }
    }
}
