//! Client for a queue-style generation API.
//!
//! Requests are submitted to `POST {base}/{model}`, polled at
//! `GET {base}/{model}/requests/{id}/status` and, once completed, the
//! result document is read from `GET {base}/{model}/requests/{id}`. The
//! media URL is located inside that document with a JSON pointer, which
//! differs between video (`/video/url`) and music (`/audio/url`) models.

use async_trait::async_trait;
use serde::Deserialize;
use storyreel_core::capabilities::{GenerationProvider, ProviderError};
use storyreel_core::generation::{GenerationKind, GenerationRequest, ProviderJobState};

use crate::error::{ensure_success, parse_response, ProviderApiError};

/// JSON pointer to the media URL in a video result.
pub const VIDEO_RESULT_POINTER: &str = "/video/url";

/// JSON pointer to the media URL in a music result.
pub const AUDIO_RESULT_POINTER: &str = "/audio/url";

/// HTTP client for one generation API and result shape.
pub struct HttpGenerationProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    result_pointer: String,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    request_id: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    #[serde(default)]
    error: Option<String>,
}

impl HttpGenerationProvider {
    /// Create a client reusing an existing [`reqwest::Client`].
    ///
    /// * `base_url` - API root, e.g. `https://queue.example.com`.
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        kind: GenerationKind,
    ) -> Self {
        let result_pointer = match kind {
            GenerationKind::Video => VIDEO_RESULT_POINTER,
            GenerationKind::Music => AUDIO_RESULT_POINTER,
        };
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            result_pointer: result_pointer.to_string(),
        }
    }

    fn model_url(&self, model_id: &str) -> String {
        format!("{}/{}", self.base_url, model_id)
    }

    fn request_url(&self, model_id: &str, request_id: &str) -> String {
        format!("{}/requests/{}", self.model_url(model_id), request_id)
    }

    fn auth_header(&self) -> String {
        format!("Key {}", self.api_key)
    }

    async fn fetch_result_url(&self, model_id: &str, request_id: &str) -> Result<String, ProviderApiError> {
        let response = self
            .client
            .get(self.request_url(model_id, request_id))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .send()
            .await?;
        let document: serde_json::Value = parse_response(response).await?;
        extract_result_url(&document, &self.result_pointer)
    }
}

/// Build the submit payload: prompt, reference images, then every config
/// key merged at the top level.
pub fn build_submit_body(request: &GenerationRequest) -> serde_json::Value {
    let mut body = serde_json::json!({ "prompt": request.prompt });
    if !request.reference_assets.is_empty() {
        body["image_urls"] = serde_json::json!(request.reference_assets);
    }
    if let (Some(target), Some(extra)) = (body.as_object_mut(), request.config.as_object()) {
        for (k, v) in extra {
            target.insert(k.clone(), v.clone());
        }
    }
    body
}

/// Locate the media URL inside a result document.
pub fn extract_result_url(document: &serde_json::Value, pointer: &str) -> Result<String, ProviderApiError> {
    document
        .pointer(pointer)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ProviderApiError::Decode(format!("result has no media URL at '{pointer}'")))
}

/// Map a provider status string to a pending state.
///
/// `COMPLETED` and `FAILED` are resolved by the caller since they need a
/// follow-up request or the error field.
fn classify_status(status: &StatusResponse) -> Result<Option<ProviderJobState>, ProviderApiError> {
    match status.status.as_str() {
        "IN_QUEUE" => Ok(Some(ProviderJobState::Queued)),
        "IN_PROGRESS" => Ok(Some(ProviderJobState::InProgress)),
        "FAILED" => Ok(Some(ProviderJobState::Failed {
            reason: status
                .error
                .clone()
                .unwrap_or_else(|| "Provider reported failure".to_string()),
        })),
        "COMPLETED" => Ok(None),
        other => Err(ProviderApiError::Decode(format!("unknown status '{other}'"))),
    }
}

#[async_trait]
impl GenerationProvider for HttpGenerationProvider {
    async fn submit(&self, model_id: &str, request: &GenerationRequest) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(self.model_url(model_id))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .json(&build_submit_body(request))
            .send()
            .await
            .map_err(ProviderApiError::from)?;
        let submitted: SubmitResponse = parse_response(response).await?;
        tracing::debug!(model_id, request_id = %submitted.request_id, "Generation request accepted");
        Ok(submitted.request_id)
    }

    async fn check_status(&self, model_id: &str, request_id: &str) -> Result<ProviderJobState, ProviderError> {
        let response = self
            .client
            .get(format!("{}/status", self.request_url(model_id, request_id)))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .send()
            .await
            .map_err(ProviderApiError::from)?;
        let status: StatusResponse = parse_response(response).await?;

        match classify_status(&status)? {
            Some(state) => Ok(state),
            None => {
                let result_url = self.fetch_result_url(model_id, request_id).await?;
                Ok(ProviderJobState::Completed { result_url })
            }
        }
    }

    async fn fetch_result(&self, result_url: &str) -> Result<Vec<u8>, ProviderError> {
        let response = self
            .client
            .get(result_url)
            .send()
            .await
            .map_err(ProviderApiError::from)?;
        let response = ensure_success(response).await?;
        let bytes = response.bytes().await.map_err(ProviderApiError::from)?;
        Ok(bytes.to_vec())
    }
}
