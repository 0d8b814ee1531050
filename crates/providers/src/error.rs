//! HTTP-layer errors shared by the provider clients.

use storyreel_core::capabilities::ProviderError;

/// Errors from the provider REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ProviderApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider returned a non-2xx status code.
    #[error("Provider API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The body parsed but did not have the expected shape.
    #[error("Unexpected provider response: {0}")]
    Decode(String),
}

impl From<ProviderApiError> for ProviderError {
    fn from(err: ProviderApiError) -> Self {
        match err {
            ProviderApiError::Request(e) => ProviderError::Request(e.to_string()),
            ProviderApiError::ApiError { status, body } => ProviderError::Rejected { status, body },
            ProviderApiError::Decode(msg) => ProviderError::InvalidResponse(msg),
        }
    }
}

/// Ensure the response has a success status code. Returns the response
/// unchanged on success, or a [`ProviderApiError::ApiError`] containing the
/// status and body text on failure.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderApiError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(ProviderApiError::ApiError {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

/// Parse a successful JSON response body into the expected type.
pub(crate) async fn parse_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ProviderApiError> {
    let response = ensure_success(response).await?;
    Ok(response.json::<T>().await?)
}
