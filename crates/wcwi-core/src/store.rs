//! Durable message store
//!
//! The store keeps the ordered list of [`ChatMessage`] records in memory and
//! mirrors it to a single pretty-printed JSON file. Image attachments are kept
//! as raw bytes in a sibling directory, one file per message, named from the
//! message id.
//!
//! Every write goes to a temporary file that is then renamed over the target,
//! so a crash mid-write leaves the previously committed file intact. The store
//! takes `&mut self` for all mutations; callers serialize access (the engine
//! holds it behind a single mutex).
//!
//! Mutations update the in-memory view before persisting, and the record file
//! is rewritten even when an attachment file could not be written or
//! deleted. Any failure is returned after that; the in-memory change stands,
//! so the application keeps working on the current view.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::StoreConfig;
use crate::errors::StorageError;
use crate::types::{AttachmentRef, ChatMessage, MessageId};

type StoreResult<T> = std::result::Result<T, StorageError>;

// ----------------------------------------------------------------------------
// Message Store
// ----------------------------------------------------------------------------

#[derive(Debug)]
pub struct MessageStore {
    config: StoreConfig,
    messages: Vec<ChatMessage>,
}

impl MessageStore {
    /// Open the store, creating its directories and loading any existing log
    pub fn open(config: StoreConfig) -> StoreResult<Self> {
        let images = config.images_path();
        fs::create_dir_all(&images).map_err(|source| StorageError::Write {
            path: images.clone(),
            source,
        })?;

        let messages = load_records(&config.messages_path())?;
        debug!(
            path = %config.messages_path().display(),
            count = messages.len(),
            "Opened message store"
        );

        Ok(Self { config, messages })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// All records in insertion order
    pub fn all(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &MessageId> {
        self.messages.iter().map(|m| &m.id)
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.position(id).is_some()
    }

    pub fn get(&self, id: &MessageId) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| &m.id == id)
    }

    /// Append a record and, if given, its attachment bytes
    ///
    /// A message carrying bytes but no attachment handle gets the
    /// deterministic handle for its id.
    pub fn append(&mut self, mut message: ChatMessage, attachment: Option<&[u8]>) -> StoreResult<()> {
        if self.contains(&message.id) {
            return Err(StorageError::DuplicateId {
                id: message.id.to_string(),
            });
        }

        if attachment.is_some() && message.attachment.is_none() {
            message.attachment = Some(AttachmentRef::for_message(&message.id));
        }

        let attachment_path = message
            .attachment
            .as_ref()
            .map(|a| self.config.images_path().join(&a.file_name));
        let id = message.id.clone();
        self.messages.push(message);

        let stored = match (attachment, attachment_path) {
            (Some(bytes), Some(path)) => write_atomic(&path, bytes).map(|()| {
                debug!(message_id = %id, bytes = bytes.len(), "Stored attachment");
            }),
            _ => Ok(()),
        };
        if let Err(e) = &stored {
            warn!(message_id = %id, error = %e, "Failed to store attachment");
        }
        self.persist()?;
        stored
    }

    /// Delete a record and its attachment; `Ok(false)` when absent
    pub fn remove(&mut self, id: &MessageId) -> StoreResult<bool> {
        let Some(attachment) = self.remove_record(id) else {
            return Ok(false);
        };
        self.persist()?;
        attachment.map(|()| true)
    }

    /// Remove `id` and append the standard removal notice
    ///
    /// Returns the appended notice, or `None` if `id` was not stored.
    pub fn tombstone(&mut self, id: &MessageId) -> StoreResult<Option<ChatMessage>> {
        if !self.contains(id) {
            return Ok(None);
        }
        let notice = ChatMessage::removal_notice(false);
        self.tombstone_with(id, notice.clone())?;
        Ok(Some(notice))
    }

    /// Remove `id` and append `notice` in one persisted step
    ///
    /// The notice is appended even if the attachment file cannot be deleted;
    /// that failure is returned after the record file is rewritten.
    pub fn tombstone_with(&mut self, id: &MessageId, notice: ChatMessage) -> StoreResult<bool> {
        let Some(attachment) = self.remove_record(id) else {
            return Ok(false);
        };
        self.messages.push(notice);
        self.persist()?;
        attachment.map(|()| true)
    }

    /// Raw bytes of the attachment owned by `id`
    pub fn load_attachment(&self, id: &MessageId) -> StoreResult<Option<Vec<u8>>> {
        let Some(attachment) = self.get(id).and_then(|m| m.attachment.as_ref()) else {
            return Ok(None);
        };
        let path = self.config.images_path().join(&attachment.file_name);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Read { path, source }),
        }
    }

    /// Rewrite the record file from the in-memory view
    pub fn persist(&self) -> StoreResult<()> {
        let json = serde_json::to_vec_pretty(&self.messages).map_err(StorageError::Serialize)?;
        write_atomic(&self.config.messages_path(), &json)
    }

    fn position(&self, id: &MessageId) -> Option<usize> {
        self.messages.iter().position(|m| &m.id == id)
    }

    /// Drop the record from memory and delete its attachment file
    ///
    /// `None` when `id` is not stored; otherwise the outcome of the file
    /// deletion, which never undoes the in-memory removal.
    fn remove_record(&mut self, id: &MessageId) -> Option<StoreResult<()>> {
        let index = self.position(id)?;
        let removed = self.messages.remove(index);

        let Some(attachment) = removed.attachment else {
            return Some(Ok(()));
        };
        let path = self.config.images_path().join(&attachment.file_name);
        Some(match fs::remove_file(&path) {
            Ok(()) => {
                debug!(message_id = %id, "Removed attachment");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => {
                warn!(message_id = %id, error = %source, "Failed to remove attachment");
                Err(StorageError::Remove { path, source })
            }
        })
    }
}

// ----------------------------------------------------------------------------
// File Helpers
// ----------------------------------------------------------------------------

fn load_records(path: &Path) -> StoreResult<Vec<ChatMessage>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(StorageError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    serde_json::from_slice(&bytes).map_err(|source| StorageError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

/// Write to `<path>.tmp` then rename over `path`
fn write_atomic(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    let tmp = tmp_path(path);
    let to_err = |source| StorageError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(to_err)?;
    }
    fs::write(&tmp, bytes).map_err(to_err)?;
    fs::rename(&tmp, path).map_err(to_err)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
