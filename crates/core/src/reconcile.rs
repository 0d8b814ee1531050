//! Duration reconciliation between a generated clip and its narration.
//!
//! Narration length is authoritative. A clip shorter than its narration is
//! slowed down to span it; a longer clip is cut at the end of the narration.

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reconciliation {
    /// Multiplier applied to presentation timestamps (`setpts=F*PTS`).
    pub stretch_factor: f64,
    /// Length of the composed clip in seconds (the narration length).
    pub output_duration: f64,
}

impl Reconciliation {
    pub fn plan(video_duration: f64, audio_duration: f64) -> Result<Self, CoreError> {
        if !(video_duration.is_finite() && video_duration > 0.0) {
            return Err(CoreError::Validation(format!(
                "Video duration must be positive, got {video_duration}"
            )));
        }
        if !(audio_duration.is_finite() && audio_duration > 0.0) {
            return Err(CoreError::Validation(format!(
                "Audio duration must be positive, got {audio_duration}"
            )));
        }

        let stretch_factor = if audio_duration > video_duration {
            audio_duration / video_duration
        } else {
            1.0
        };

        Ok(Self {
            stretch_factor,
            output_duration: audio_duration,
        })
    }

    pub fn is_stretched(&self) -> bool {
        self.stretch_factor > 1.0
    }
}
