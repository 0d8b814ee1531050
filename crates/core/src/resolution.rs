//! Aspect-ratio presets for composed clips and thumbnails.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Output aspect ratio selected in the project settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "9:16")]
    Portrait,
}

/// All supported aspect ratios.
pub const VALID_ASPECT_RATIOS: &[&str] = &["16:9", "1:1", "9:16"];

impl AspectRatio {
    /// Parse the settings representation (`"16:9"`, `"1:1"`, `"9:16"`).
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s.trim() {
            "16:9" => Ok(Self::Landscape),
            "1:1" => Ok(Self::Square),
            "9:16" => Ok(Self::Portrait),
            other => Err(CoreError::Validation(format!(
                "Unknown aspect ratio '{other}'. Valid: {VALID_ASPECT_RATIOS:?}"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Landscape => "16:9",
            Self::Square => "1:1",
            Self::Portrait => "9:16",
        }
    }

    /// Resolution preset `(width, height)` used for thumbnails and for
    /// normalising composed scene clips so they can be cross-faded.
    pub fn resolution(self) -> (u32, u32) {
        match self {
            Self::Landscape => (1280, 720),
            Self::Square => (720, 720),
            Self::Portrait => (720, 1280),
        }
    }
}
