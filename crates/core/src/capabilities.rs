//! Capability interfaces for the pipeline's external collaborators.
//!
//! The orchestrator only sees these traits. Concrete HTTP, S3 and Postgres
//! implementations live in the `providers` and `db` crates; tests use
//! in-memory fakes.

use std::path::Path;

use async_trait::async_trait;

use crate::generation::{GenerationRequest, ProviderJobState};
use crate::project::Project;
use crate::subtitles::CharacterAlignment;
use crate::types::DbId;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure reported by a generation or speech provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider request failed: {0}")]
    Request(String),

    #[error("Provider rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Provider returned an invalid response: {0}")]
    InvalidResponse(String),

    #[error("Unknown model '{0}'")]
    UnknownModel(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Upload of '{key}' failed: {reason}")]
    Upload { key: String, reason: String },

    #[error("Download of '{key}' failed: {reason}")]
    Download { key: String, reason: String },

    #[error("Delete of '{key}' failed: {reason}")]
    Delete { key: String, reason: String },

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of the project persistence collaborator.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Project {0} not found")]
    NotFound(DbId),

    #[error("Project store error: {0}")]
    Backend(String),
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// A long-running render backend (video or music model).
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Submit a request and return the provider's opaque request id.
    async fn submit(&self, model_id: &str, request: &GenerationRequest) -> Result<String, ProviderError>;

    /// Current provider-side state of `request_id`.
    async fn check_status(&self, model_id: &str, request_id: &str) -> Result<ProviderJobState, ProviderError>;

    /// Download a completed result.
    async fn fetch_result(&self, result_url: &str) -> Result<Vec<u8>, ProviderError>;
}

/// Narration audio with character-level alignment.
#[derive(Debug, Clone)]
pub struct SpeechSynthesis {
    pub audio: Vec<u8>,
    pub content_type: String,
    pub alignment: CharacterAlignment,
}

#[async_trait]
pub trait SpeechProvider: Send + Sync {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<SpeechSynthesis, ProviderError>;
}

/// Durable object storage.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` at `key` and return its public URL.
    async fn upload_buffer(&self, bytes: Vec<u8>, key: &str, content_type: &str) -> Result<String, StorageError>;

    /// Write the object at `key` to `local_path`.
    async fn download_file(&self, key: &str, local_path: &Path) -> Result<(), StorageError>;

    async fn delete_file(&self, key: &str) -> Result<(), StorageError>;
}

/// Project persistence. Reads and writes whole records; the last write wins.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn load_project(&self, project_id: DbId) -> Result<Project, StoreError>;

    async fn save_project(&self, project: &Project) -> Result<(), StoreError>;
}
