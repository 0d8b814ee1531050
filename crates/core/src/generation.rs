//! Generation job types shared by the poller and the providers.

use serde::{Deserialize, Serialize};

/// What a generation job renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationKind {
    Video,
    Music,
}

impl GenerationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Music => "music",
        }
    }

    /// Content type of the downloaded artifact.
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Video => "video/mp4",
            Self::Music => "audio/mpeg",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl GenerationStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Input handed to a generation provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    /// Reference image URLs (scene image first, then character references).
    pub reference_assets: Vec<String>,
    /// Provider-specific options (aspect ratio, duration hints).
    pub config: serde_json::Value,
}

/// A tracked asynchronous render job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationJob {
    /// Opaque provider handle.
    pub request_id: String,
    /// Destination key in durable storage.
    pub storage_key: String,
    pub status: GenerationStatus,
    pub model_id: String,
    pub kind: GenerationKind,
    /// Human-readable owner, e.g. `scene 3` or `music`.
    pub label: String,
    /// Order of the scene this job renders; `None` for project-wide jobs.
    #[serde(default)]
    pub scene_order: Option<i32>,
    /// Durable URL once the artifact was stored.
    #[serde(default)]
    pub result_url: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl GenerationJob {
    /// A freshly submitted job (`processing`).
    pub fn submitted(
        request_id: impl Into<String>,
        storage_key: impl Into<String>,
        model_id: impl Into<String>,
        kind: GenerationKind,
        label: impl Into<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            storage_key: storage_key.into(),
            status: GenerationStatus::Processing,
            model_id: model_id.into(),
            kind,
            label: label.into(),
            scene_order: None,
            result_url: None,
            error: None,
        }
    }
}

/// Provider-reported state of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderJobState {
    Queued,
    InProgress,
    Completed { result_url: String },
    Failed { reason: String },
}

impl ProviderJobState {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Queued | Self::InProgress)
    }
}
