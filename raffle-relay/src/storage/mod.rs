//! Participant credential storage.
//!
//! Each enrolled participant has exactly one Alphabot API key, keyed by their chat identity. The
//! store is read by the fan-out orchestrator (snapshot of everyone) and by the command surface
//! (single lookups and writes).
//!
//! Reads never fail: a missing or unreadable backing store is logged and treated as empty, so a
//! damaged file can't take the webhook path down. Writes are durable before they return and
//! report failure to the caller, including when the existing store can't be read.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::types::ParticipantId;

pub mod json_file;

pub use json_file::JsonFileStore;

/// Result type for credential store mutations
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors surfaced by mutating store operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Reading or writing the backing file failed
    #[error("credential store I/O failed at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The backing file exists but isn't a JSON object, so it can't be safely updated
    #[error("credential store at {} is not a valid JSON object: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The credential map could not be encoded
    #[error("failed to serialize credentials: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Keyed storage of one secret token per participant.
///
/// Implementations serialize all access internally; callers never need their own locking.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert or overwrite the token for a participant.
    async fn set(&self, participant_id: &str, token: &str) -> Result<()>;

    /// Delete a participant's token.
    ///
    /// Returns `true` if a record existed and was removed, `false` if there was nothing to remove.
    async fn remove(&self, participant_id: &str) -> Result<bool>;

    /// Look up a participant's token. `None` means "not enrolled".
    async fn get(&self, participant_id: &str) -> Option<String>;

    /// Point-in-time snapshot of every enrolled participant.
    async fn list_all(&self) -> HashMap<ParticipantId, String>;

    /// Number of enrolled participants.
    async fn count(&self) -> usize;
}
