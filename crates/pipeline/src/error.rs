//! Error taxonomy of a pipeline run.

use storyreel_core::capabilities::{ProviderError, StorageError, StoreError};
use storyreel_core::error::CoreError;
use storyreel_core::ffmpeg::FfmpegError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Input is incomplete or inconsistent. Raised before external calls.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A generation or TTS provider failed.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Polling ran out of attempts with jobs still pending.
    #[error("Timed out after {attempts} poll attempts waiting for: {pending}")]
    Timeout { attempts: u32, pending: String },

    /// The media tool exited unsuccessfully or produced unusable output.
    #[error("Media processing failed: {0}")]
    MediaProcessing(#[from] FfmpegError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Reading or writing the project record failed.
    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The project is not in a state that allows the requested change.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A broken internal invariant, e.g. a scene without its generated clip.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Stable snake_case label for logs and queue failure events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Provider(_) => "provider",
            Self::Timeout { .. } => "timeout",
            Self::MediaProcessing(_) => "media_processing",
            Self::Storage(_) => "storage",
            Self::Persistence(_) => "persistence",
            Self::Io(_) => "io",
            Self::Conflict(_) => "conflict",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<CoreError> for PipelineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) => Self::Validation(msg),
            CoreError::Conflict(msg) => Self::Conflict(msg),
            other @ (CoreError::NotFound { .. } | CoreError::Internal(_)) => {
                Self::Internal(other.to_string())
            }
        }
    }
}

impl From<ProviderError> for PipelineError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::UnknownModel(model) => {
                Self::Validation(format!("No provider registered for model '{model}'"))
            }
            other => Self::Provider(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn unknown_model_is_validation() {
        let err: PipelineError = ProviderError::UnknownModel("x".into()).into();
        assert_matches!(err, PipelineError::Validation(_));
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn core_errors_keep_their_category() {
        let err: PipelineError = CoreError::Validation("no scenes".into()).into();
        assert_eq!(err.kind(), "validation");

        let err: PipelineError =
            CoreError::Conflict("Project 9 cannot move from 'completed' to 'completed'".into())
                .into();
        assert_matches!(&err, PipelineError::Conflict(msg) if msg.contains("cannot move"));
        assert_eq!(err.kind(), "conflict");

        let err: PipelineError = CoreError::NotFound {
            entity: "project",
            id: 9,
        }
        .into();
        assert_eq!(err.kind(), "internal");

        let err: PipelineError = CoreError::Internal("bad state".into()).into();
        assert_matches!(err, PipelineError::Internal(_));
    }

    #[test]
    fn ffmpeg_failure_is_media_processing() {
        let err: PipelineError = FfmpegError::ExecutionFailed {
            exit_code: Some(1),
            stderr: "Invalid data".into(),
        }
        .into();
        assert_eq!(err.kind(), "media_processing");
        assert!(err.to_string().contains("Invalid data"));
    }

    #[test]
    fn timeout_names_pending_jobs() {
        let err = PipelineError::Timeout {
            attempts: 120,
            pending: "scene 2, scene 3".into(),
        };
        assert_eq!(
            err.to_string(),
            "Timed out after 120 poll attempts waiting for: scene 2, scene 3"
        );
    }
}
