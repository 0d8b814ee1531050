//! Project record, scene breakdown, and progress-history types.
//!
//! The project record is the single shared mutable resource of a pipeline
//! invocation. It is read and written back as a whole (last writer wins),
//! so every mutation here is a pure in-memory edit; persistence happens
//! through [`crate::capabilities::ProjectStore`].

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::resolution::AspectRatio;
use crate::types::{DbId, JobId, Timestamp};

// ---------------------------------------------------------------------------
// Project status
// ---------------------------------------------------------------------------

/// Project lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Storyboard,
    Settings,
    Breakdown,
    Generating,
    Completed,
    Failed,
}

impl ProjectStatus {
    /// Database / wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Storyboard => "storyboard",
            Self::Settings => "settings",
            Self::Breakdown => "breakdown",
            Self::Generating => "generating",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse from the database `status` column.
    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        match name {
            "storyboard" => Ok(Self::Storyboard),
            "settings" => Ok(Self::Settings),
            "breakdown" => Ok(Self::Breakdown),
            "generating" => Ok(Self::Generating),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(CoreError::Validation(format!(
                "Unknown project status '{other}'"
            ))),
        }
    }

    fn rank(self) -> u8 {
        match self {
            Self::Storyboard => 0,
            Self::Settings => 1,
            Self::Breakdown => 2,
            Self::Generating => 3,
            Self::Completed | Self::Failed => 4,
        }
    }

    /// `completed` and `failed` end a generation run.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `self -> next` is a legal transition.
    ///
    /// Statuses only move forward. The single backward edge is a terminal
    /// status re-entering `generating`, which happens when a new job is
    /// submitted for the same project.
    pub fn can_transition_to(self, next: Self) -> bool {
        if self == next {
            return !self.is_terminal();
        }
        match (self, next) {
            (Self::Completed | Self::Failed, Self::Generating) => true,
            (Self::Completed | Self::Failed, _) => false,
            _ => next.rank() > self.rank(),
        }
    }
}

// ---------------------------------------------------------------------------
// Breakdown & settings
// ---------------------------------------------------------------------------

/// Structured scene list derived from a storyboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakdown {
    pub scenes: Vec<Scene>,
    #[serde(default)]
    pub music_description: Option<String>,
}

impl Breakdown {
    /// Trimmed music brief, or `None` when the music stage should be skipped.
    pub fn music_brief(&self) -> Option<&str> {
        self.music_description
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Scenes sorted by their authoritative `order`.
    pub fn ordered_scenes(&self) -> Vec<Scene> {
        let mut scenes = self.scenes.clone();
        scenes.sort_by_key(|s| s.order);
        scenes
    }

    /// Find a scene by its `order`.
    pub fn scene_mut(&mut self, order: i32) -> Option<&mut Scene> {
        self.scenes.iter_mut().find(|s| s.order == order)
    }
}

/// One narrated visual unit of the final video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub id: String,
    /// Fixed at breakdown time; never renumbered downstream.
    pub order: i32,
    pub image_url: String,
    #[serde(default)]
    pub image_description: String,
    pub voice_over: String,
    /// Padded narration length in seconds, set after synthesis.
    #[serde(default)]
    pub duration: Option<f64>,
}

/// A character whose reference image is passed to the video model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSettings {
    pub video_model: String,
    #[serde(default)]
    pub aspect_ratio: AspectRatio,
    #[serde(default)]
    pub style: String,
    #[serde(default)]
    pub characters: Vec<Character>,
    /// Narration voice; the worker's default voice is used when absent.
    #[serde(default)]
    pub voice_id: Option<String>,
}

/// Final artifact recorded on a completed project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoInfo {
    pub url: String,
    pub storage_key: String,
    /// Sum of the per-scene narration durations, in seconds.
    pub duration: f64,
    pub thumbnail_url: String,
}

// ---------------------------------------------------------------------------
// Progress history
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobRecordStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

/// Progress-history entry, keyed by job id inside [`Project::history`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub status: JobRecordStatus,
    /// Completion percentage (0-100).
    pub progress: u8,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl JobRecord {
    pub fn queued(now: Timestamp) -> Self {
        Self {
            status: JobRecordStatus::Queued,
            progress: 0,
            created_at: now,
            updated_at: now,
            error_message: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Project
// ---------------------------------------------------------------------------

/// A persisted project record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: DbId,
    pub user_id: DbId,
    pub status: ProjectStatus,
    pub breakdown: Option<Breakdown>,
    pub settings: Option<ProjectSettings>,
    #[serde(default)]
    pub history: BTreeMap<JobId, JobRecord>,
    pub video: Option<VideoInfo>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Project {
    /// Move to `next`, rejecting backward transitions.
    pub fn transition_to(&mut self, next: ProjectStatus, now: Timestamp) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::Conflict(format!(
                "Project {} cannot move from '{}' to '{}'",
                self.id,
                self.status.as_str(),
                next.as_str()
            )));
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Insert or update the history entry for `job_id`.
    ///
    /// The recorded progress never decreases.
    pub fn record_job(
        &mut self,
        job_id: JobId,
        status: JobRecordStatus,
        progress: u8,
        error_message: Option<String>,
        now: Timestamp,
    ) {
        let entry = self
            .history
            .entry(job_id)
            .or_insert_with(|| JobRecord::queued(now));
        entry.status = status;
        entry.progress = entry.progress.max(progress.min(100));
        entry.error_message = error_message;
        entry.updated_at = now;
        self.updated_at = now;
    }
}

/// Validate that a project carries everything the pipeline needs.
///
/// Returns the breakdown and settings on success. This runs before any
/// external call is made.
pub fn validate_for_generation(
    project: &Project,
) -> Result<(&Breakdown, &ProjectSettings), CoreError> {
    let breakdown = project.breakdown.as_ref().ok_or_else(|| {
        CoreError::Validation(format!("Project {} has no scene breakdown", project.id))
    })?;
    let settings = project.settings.as_ref().ok_or_else(|| {
        CoreError::Validation(format!("Project {} has no settings", project.id))
    })?;

    if breakdown.scenes.is_empty() {
        return Err(CoreError::Validation(format!(
            "Project {} breakdown contains no scenes",
            project.id
        )));
    }
    if settings.video_model.trim().is_empty() {
        return Err(CoreError::Validation(
            "settings.videoModel must not be empty".to_string(),
        ));
    }

    validate_scene_orders(&breakdown.scenes)?;

    for scene in &breakdown.scenes {
        if scene.voice_over.trim().is_empty() {
            return Err(CoreError::Validation(format!(
                "Scene {} has no narration text",
                scene.order
            )));
        }
        if scene.image_url.trim().is_empty() {
            return Err(CoreError::Validation(format!(
                "Scene {} has no image",
                scene.order
            )));
        }
    }

    Ok((breakdown, settings))
}

/// Scene orders must be unique and contiguous, starting at 0 or 1.
fn validate_scene_orders(scenes: &[Scene]) -> Result<(), CoreError> {
    let orders: BTreeSet<i32> = scenes.iter().map(|s| s.order).collect();
    if orders.len() != scenes.len() {
        return Err(CoreError::Validation(
            "Scene orders must be unique".to_string(),
        ));
    }
    let first = orders.first().copied().unwrap_or(0);
    if first != 0 && first != 1 {
        return Err(CoreError::Validation(format!(
            "Scene orders must start at 0 or 1, got {first}"
        )));
    }
    let expected_last = first + scenes.len() as i32 - 1;
    if orders.last().copied() != Some(expected_last) {
        return Err(CoreError::Validation(
            "Scene orders must be contiguous".to_string(),
        ));
    }
    Ok(())
}
