//! Model id to generation provider lookup.

use std::collections::HashMap;
use std::sync::Arc;

use storyreel_core::capabilities::{GenerationProvider, ProviderError};

/// Maps model identifiers to the provider that serves them.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn GenerationProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` for `model_id`, replacing any previous entry.
    pub fn register(&mut self, model_id: impl Into<String>, provider: Arc<dyn GenerationProvider>) {
        self.providers.insert(model_id.into(), provider);
    }

    pub fn with(mut self, model_id: impl Into<String>, provider: Arc<dyn GenerationProvider>) -> Self {
        self.register(model_id, provider);
        self
    }

    /// Provider for `model_id`, or [`ProviderError::UnknownModel`].
    pub fn get(&self, model_id: &str) -> Result<Arc<dyn GenerationProvider>, ProviderError> {
        self.providers
            .get(model_id)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownModel(model_id.to_string()))
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.providers.contains_key(model_id)
    }

    /// Registered model ids, sorted.
    pub fn models(&self) -> Vec<&str> {
        let mut models: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        models.sort_unstable();
        models
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("models", &self.models())
            .finish()
    }
}
