//! Concrete implementations of the pipeline's external capabilities.
//!
//! - [`HttpGenerationProvider`]: queue-style render API (video and music).
//! - [`ProviderRegistry`]: model id to generation provider lookup.
//! - [`HttpSpeechProvider`]: text-to-speech with character timestamps.
//! - [`S3Storage`]: S3-compatible durable storage.

pub mod error;
pub mod generation;
pub mod registry;
pub mod speech;
pub mod storage;

pub use error::ProviderApiError;
pub use generation::HttpGenerationProvider;
pub use registry::ProviderRegistry;
pub use speech::HttpSpeechProvider;
pub use storage::{S3Config, S3Storage};
