//! Worker configuration loaded from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use storyreel_core::ffmpeg::MediaBinaries;
use storyreel_core::poll::{PollPolicy, DEFAULT_MAX_POLL_ATTEMPTS};
use storyreel_pipeline::compositor::{SubtitlePosition, SubtitleStyle};
use storyreel_pipeline::media::DEFAULT_SUBTITLE_BATCH_SIZE;
use storyreel_pipeline::orchestrator::{DEFAULT_MUSIC_VOLUME, DEFAULT_VOICE_ID};
use storyreel_pipeline::{MediaConfig, PipelineConfig};
use storyreel_providers::S3Config;

pub const DEFAULT_CONCURRENCY: usize = 2;
pub const DEFAULT_QUEUE_NAME: &str = "video-generation";
pub const DEFAULT_QUEUE_POLL_INTERVAL_MS: u64 = 1000;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_TTS_MODEL: &str = "eleven_multilingual_v2";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// `LOG_FORMAT`, falling back to text for unset or unknown values.
    pub fn from_env() -> Self {
        std::env::var("LOG_FORMAT")
            .ok()
            .and_then(|v| Self::parse(&v))
            .unwrap_or_default()
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "text" | "pretty" | "" => Some(Self::Text),
            _ => None,
        }
    }
}

/// Everything the worker binary needs to run.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    /// Pipeline invocations run at the same time.
    pub concurrency: usize,
    pub queue_name: String,
    /// Delay between queue claims when idle.
    pub queue_poll_interval: Duration,
    pub work_dir: PathBuf,

    pub generation_api_url: String,
    pub generation_api_key: String,
    /// Video model ids served by the generation API.
    pub generation_models: Vec<String>,
    pub music_model: Option<String>,

    pub tts_api_url: String,
    pub tts_api_key: String,
    pub tts_model: String,
    pub default_voice_id: String,

    pub storage: S3Config,

    pub poll: PollPolicy,
    pub binaries: MediaBinaries,
    pub subtitle_position: SubtitlePosition,
    pub subtitle_batch_size: usize,
    pub music_volume: f64,
    pub log_format: LogFormat,
}

impl WorkerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                     | Required | Default                  |
    /// |-----------------------------|----------|--------------------------|
    /// | `DATABASE_URL`              | yes      | --                       |
    /// | `WORKER_CONCURRENCY`        | no       | `2`                      |
    /// | `QUEUE_NAME`                | no       | `video-generation`       |
    /// | `QUEUE_POLL_INTERVAL_MS`    | no       | `1000`                   |
    /// | `WORK_DIR`                  | no       | system temp dir          |
    /// | `GENERATION_API_URL`        | yes      | --                       |
    /// | `GENERATION_API_KEY`        | yes      | --                       |
    /// | `GENERATION_MODELS`         | yes      | -- (comma-separated)     |
    /// | `MUSIC_MODEL`               | no       | music disabled           |
    /// | `TTS_API_URL`               | yes      | --                       |
    /// | `TTS_API_KEY`               | yes      | --                       |
    /// | `TTS_MODEL`                 | no       | `eleven_multilingual_v2` |
    /// | `DEFAULT_VOICE_ID`          | no       | built-in voice           |
    /// | `STORAGE_BUCKET`            | yes      | --                       |
    /// | `STORAGE_REGION`            | no       | `us-east-1`              |
    /// | `STORAGE_ENDPOINT`          | no       | AWS                      |
    /// | `STORAGE_PUBLIC_URL`        | yes      | --                       |
    /// | `STORAGE_ACCESS_KEY_ID`     | no       | AWS provider chain       |
    /// | `STORAGE_SECRET_ACCESS_KEY` | no       | AWS provider chain       |
    /// | `POLL_INTERVAL_SECS`        | no       | `10`                     |
    /// | `POLL_MAX_ATTEMPTS`         | no       | `120`                    |
    /// | `FFMPEG_BIN`                | no       | `ffmpeg`                 |
    /// | `FFPROBE_BIN`               | no       | `ffprobe`                |
    /// | `SUBTITLE_POSITION`         | no       | `bottom`                 |
    /// | `SUBTITLE_BATCH_SIZE`       | no       | `40`                     |
    /// | `MUSIC_VOLUME`              | no       | `0.3`                    |
    /// | `LOG_FORMAT`                | no       | `text` (`json`)          |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup` instead of the process
    /// environment.
    pub fn from_lookup<L>(lookup: L) -> Result<Self, ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let concurrency: usize = env.parsed("WORKER_CONCURRENCY", DEFAULT_CONCURRENCY)?;
        if concurrency == 0 {
            return Err(ConfigError::Invalid {
                var: "WORKER_CONCURRENCY",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }

        let generation_models: Vec<String> = env
            .required("GENERATION_MODELS")?
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if generation_models.is_empty() {
            return Err(ConfigError::Missing("GENERATION_MODELS"));
        }

        let music_volume: f64 = env.parsed("MUSIC_VOLUME", DEFAULT_MUSIC_VOLUME)?;
        if !(0.0..=1.0).contains(&music_volume) {
            return Err(ConfigError::Invalid {
                var: "MUSIC_VOLUME",
                value: music_volume.to_string(),
                reason: "must be between 0 and 1".into(),
            });
        }

        let subtitle_position = match env.optional("SUBTITLE_POSITION") {
            None => SubtitlePosition::default(),
            Some(value) => SubtitlePosition::parse(&value).ok_or_else(|| ConfigError::Invalid {
                var: "SUBTITLE_POSITION",
                value,
                reason: "expected top, center or bottom".into(),
            })?,
        };

        let log_format = match env.optional("LOG_FORMAT") {
            None => LogFormat::default(),
            Some(value) => LogFormat::parse(&value).ok_or_else(|| ConfigError::Invalid {
                var: "LOG_FORMAT",
                value,
                reason: "expected text or json".into(),
            })?,
        };

        let defaults = MediaBinaries::default();

        Ok(Self {
            database_url: env.required("DATABASE_URL")?,
            concurrency,
            queue_name: env
                .optional("QUEUE_NAME")
                .unwrap_or_else(|| DEFAULT_QUEUE_NAME.into()),
            queue_poll_interval: Duration::from_millis(
                env.parsed("QUEUE_POLL_INTERVAL_MS", DEFAULT_QUEUE_POLL_INTERVAL_MS)?,
            ),
            work_dir: env
                .optional("WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),

            generation_api_url: env.required("GENERATION_API_URL")?,
            generation_api_key: env.required("GENERATION_API_KEY")?,
            generation_models,
            music_model: env.optional("MUSIC_MODEL"),

            tts_api_url: env.required("TTS_API_URL")?,
            tts_api_key: env.required("TTS_API_KEY")?,
            tts_model: env
                .optional("TTS_MODEL")
                .unwrap_or_else(|| DEFAULT_TTS_MODEL.into()),
            default_voice_id: env
                .optional("DEFAULT_VOICE_ID")
                .unwrap_or_else(|| DEFAULT_VOICE_ID.into()),

            storage: S3Config {
                bucket: env.required("STORAGE_BUCKET")?,
                region: env
                    .optional("STORAGE_REGION")
                    .unwrap_or_else(|| "us-east-1".into()),
                endpoint: env.optional("STORAGE_ENDPOINT"),
                public_url: env.required("STORAGE_PUBLIC_URL")?,
                access_key_id: env.optional("STORAGE_ACCESS_KEY_ID"),
                secret_access_key: env.optional("STORAGE_SECRET_ACCESS_KEY"),
            },

            poll: PollPolicy {
                interval: Duration::from_secs(
                    env.parsed("POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?,
                ),
                max_attempts: env.parsed("POLL_MAX_ATTEMPTS", DEFAULT_MAX_POLL_ATTEMPTS)?,
            },
            binaries: MediaBinaries {
                ffmpeg: env
                    .optional("FFMPEG_BIN")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.ffmpeg),
                ffprobe: env
                    .optional("FFPROBE_BIN")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.ffprobe),
            },
            subtitle_position,
            subtitle_batch_size: env.parsed("SUBTITLE_BATCH_SIZE", DEFAULT_SUBTITLE_BATCH_SIZE)?,
            music_volume,
            log_format,
        })
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            work_dir: self.work_dir.clone(),
            poll: self.poll,
            music_model: self.music_model.clone(),
            default_voice_id: self.default_voice_id.clone(),
            subtitle_style: SubtitleStyle {
                position: self.subtitle_position,
                ..SubtitleStyle::default()
            },
            music_volume: self.music_volume,
            ..PipelineConfig::default()
        }
    }

    pub fn media_config(&self) -> MediaConfig {
        MediaConfig {
            binaries: self.binaries.clone(),
            subtitle_batch_size: self.subtitle_batch_size,
            ..MediaConfig::default()
        }
    }
}

/// Variable lookup with trimming and typed parsing.
struct Env<L>(L);

impl<L> Env<L>
where
    L: Fn(&str) -> Option<String>,
{
    /// Set and non-blank.
    fn optional(&self, name: &str) -> Option<String> {
        (self.0)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.optional(name).ok_or(ConfigError::Missing(name))
    }

    fn parsed<T>(&self, name: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(name) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
                var: name,
                reason: e.to_string(),
                value,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn base() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("DATABASE_URL", "postgres://localhost/storyreel"),
            ("GENERATION_API_URL", "https://queue.gen.test"),
            ("GENERATION_API_KEY", "gen-key"),
            ("GENERATION_MODELS", "kling-v2, veo-3 ,"),
            ("TTS_API_URL", "https://tts.test"),
            ("TTS_API_KEY", "tts-key"),
            ("STORAGE_BUCKET", "media"),
            ("STORAGE_PUBLIC_URL", "https://cdn.test"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> Result<WorkerConfig, ConfigError> {
        WorkerConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string()))
    }

    #[test]
    fn defaults_apply() {
        let config = load(&base()).unwrap();
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.queue_name, "video-generation");
        assert_eq!(config.queue_poll_interval, Duration::from_millis(1000));
        assert_eq!(config.generation_models, vec!["kling-v2", "veo-3"]);
        assert_eq!(config.music_model, None);
        assert_eq!(config.poll, PollPolicy::default());
        assert_eq!(config.storage.region, "us-east-1");
        assert_eq!(config.storage.endpoint, None);
        assert_eq!(config.subtitle_position, SubtitlePosition::Bottom);
        assert_eq!(config.music_volume, 0.3);
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.binaries, MediaBinaries::default());
    }

    #[test]
    fn overrides_are_parsed() {
        let mut vars = base();
        vars.insert("WORKER_CONCURRENCY", "4");
        vars.insert("POLL_INTERVAL_SECS", "5");
        vars.insert("POLL_MAX_ATTEMPTS", "60");
        vars.insert("MUSIC_MODEL", "stable-audio");
        vars.insert("SUBTITLE_POSITION", "top");
        vars.insert("STORAGE_ENDPOINT", "http://minio:9000");
        vars.insert("LOG_FORMAT", "json");
        let config = load(&vars).unwrap();

        assert_eq!(config.concurrency, 4);
        assert_eq!(config.poll.ceiling(), Duration::from_secs(300));
        assert_eq!(config.storage.endpoint.as_deref(), Some("http://minio:9000"));
        assert_eq!(config.log_format, LogFormat::Json);

        let pipeline = config.pipeline_config();
        assert_eq!(pipeline.music_model.as_deref(), Some("stable-audio"));
        assert_eq!(pipeline.subtitle_style.position, SubtitlePosition::Top);
        assert_eq!(pipeline.poll.max_attempts, 60);
    }

    #[test]
    fn missing_required_variable() {
        let mut vars = base();
        vars.remove("STORAGE_BUCKET");
        assert_matches!(load(&vars), Err(ConfigError::Missing("STORAGE_BUCKET")));
    }

    #[test]
    fn blank_model_list_is_missing() {
        let mut vars = base();
        vars.insert("GENERATION_MODELS", " , ");
        assert_matches!(load(&vars), Err(ConfigError::Missing("GENERATION_MODELS")));
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let mut vars = base();
        vars.insert("WORKER_CONCURRENCY", "many");
        let err = load(&vars).unwrap_err();
        assert_matches!(err, ConfigError::Invalid { var: "WORKER_CONCURRENCY", .. });

        let mut vars = base();
        vars.insert("MUSIC_VOLUME", "1.5");
        assert_matches!(load(&vars), Err(ConfigError::Invalid { var: "MUSIC_VOLUME", .. }));

        let mut vars = base();
        vars.insert("SUBTITLE_POSITION", "left");
        assert_matches!(load(&vars), Err(ConfigError::Invalid { var: "SUBTITLE_POSITION", .. }));
    }

    #[test]
    fn log_format_parsing() {
        assert_eq!(LogFormat::parse("JSON"), Some(LogFormat::Json));
        assert_eq!(LogFormat::parse("pretty"), Some(LogFormat::Text));
        assert_eq!(LogFormat::parse("xml"), None);
    }
}
