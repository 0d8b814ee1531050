//! Text-to-speech client returning character-level timestamps.

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use storyreel_core::capabilities::{ProviderError, SpeechProvider, SpeechSynthesis};
use storyreel_core::subtitles::CharacterAlignment;

use crate::error::{parse_response, ProviderApiError};

/// Output format requested from the TTS API.
const OUTPUT_FORMAT: &str = "mp3_44100_128";

/// HTTP client for `POST {base}/v1/text-to-speech/{voice}/with-timestamps`.
pub struct HttpSpeechProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model_id: String,
}

#[derive(Debug, Deserialize)]
struct TimestampedSpeech {
    audio_base64: String,
    alignment: Option<AlignmentPayload>,
}

#[derive(Debug, Deserialize)]
struct AlignmentPayload {
    characters: Vec<String>,
    character_start_times_seconds: Vec<f64>,
    character_end_times_seconds: Vec<f64>,
}

impl HttpSpeechProvider {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model_id: model_id.into(),
        }
    }

    fn synthesis_url(&self, voice_id: &str) -> String {
        format!(
            "{}/v1/text-to-speech/{}/with-timestamps?output_format={OUTPUT_FORMAT}",
            self.base_url, voice_id
        )
    }
}

/// Decode the API response into audio bytes plus validated alignment.
fn decode_speech(payload: TimestampedSpeech) -> Result<SpeechSynthesis, ProviderApiError> {
    let audio = general_purpose::STANDARD
        .decode(payload.audio_base64.as_bytes())
        .map_err(|e| ProviderApiError::Decode(format!("audio is not valid base64: {e}")))?;
    if audio.is_empty() {
        return Err(ProviderApiError::Decode("audio is empty".to_string()));
    }

    let raw = payload
        .alignment
        .ok_or_else(|| ProviderApiError::Decode("response has no alignment".to_string()))?;
    let alignment = CharacterAlignment {
        characters: raw.characters,
        start_times: raw.character_start_times_seconds,
        end_times: raw.character_end_times_seconds,
    };
    alignment
        .validate()
        .map_err(|e| ProviderApiError::Decode(e.to_string()))?;

    Ok(SpeechSynthesis {
        audio,
        content_type: "audio/mpeg".to_string(),
        alignment,
    })
}

#[async_trait]
impl SpeechProvider for HttpSpeechProvider {
    async fn synthesize(&self, text: &str, voice_id: &str) -> Result<SpeechSynthesis, ProviderError> {
        let body = serde_json::json!({
            "text": text,
            "model_id": self.model_id,
        });
        let response = self
            .client
            .post(self.synthesis_url(voice_id))
            .header("xi-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(ProviderApiError::from)?;
        let payload: TimestampedSpeech = parse_response(response).await?;
        let speech = decode_speech(payload)?;
        tracing::debug!(
            voice_id,
            bytes = speech.audio.len(),
            characters = speech.alignment.characters.len(),
            "Narration synthesized"
        );
        Ok(speech)
    }
}
