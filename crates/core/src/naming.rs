//! Storage key naming convention.
//!
//! Every artifact of a project lives under `users/{user}/projects/{project}/`.
//!
//! ```
//! use storyreel_core::naming::scene_asset_key;
//!
//! assert_eq!(
//!     scene_asset_key(4, 9, 2, "video.mp4"),
//!     "users/4/projects/9/scenes/scene-2/video.mp4"
//! );
//! ```

use crate::types::{DbId, JobId};

/// Asset name of a scene's generated clip.
pub const SCENE_VIDEO_ASSET: &str = "video.mp4";

pub fn project_prefix(user_id: DbId, project_id: DbId) -> String {
    format!("users/{user_id}/projects/{project_id}")
}

/// `users/{user}/projects/{project}/scenes/scene-{n}/{asset}`
pub fn scene_asset_key(user_id: DbId, project_id: DbId, scene_order: i32, asset: &str) -> String {
    format!(
        "{}/scenes/scene-{scene_order}/{asset}",
        project_prefix(user_id, project_id)
    )
}

pub fn music_key(user_id: DbId, project_id: DbId) -> String {
    format!("{}/music/background.mp3", project_prefix(user_id, project_id))
}

/// Final video, one per job so reruns never overwrite a previous result.
pub fn final_video_key(user_id: DbId, project_id: DbId, job_id: JobId) -> String {
    format!(
        "{}/output/video-{job_id}.mp4",
        project_prefix(user_id, project_id)
    )
}

pub fn thumbnail_key(user_id: DbId, project_id: DbId, job_id: JobId) -> String {
    format!(
        "{}/output/thumbnail-{job_id}.jpg",
        project_prefix(user_id, project_id)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_key() {
        assert_eq!(
            scene_asset_key(1, 2, 0, SCENE_VIDEO_ASSET),
            "users/1/projects/2/scenes/scene-0/video.mp4"
        );
    }

    #[test]
    fn music() {
        assert_eq!(music_key(1, 2), "users/1/projects/2/music/background.mp3");
    }

    #[test]
    fn outputs_are_keyed_by_job() {
        let job = uuid::Uuid::nil();
        assert_eq!(
            final_video_key(1, 2, job),
            "users/1/projects/2/output/video-00000000-0000-0000-0000-000000000000.mp4"
        );
        assert!(thumbnail_key(1, 2, job).ends_with("thumbnail-00000000-0000-0000-0000-000000000000.jpg"));
    }
}
