use crate::config::{ApiKey, VoiceConfig};
use crate::voice::{SpeechClient, SpeechRequest, SynthesisError, VoiceSettings};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::{Client, StatusCode};
use serde::Serialize;

const LOG_TARGET: &str = "voice::elevenlabs";

#[derive(Clone)]
pub struct ElevenLabsSpeechClient {
    client: Client,
    api_key: ApiKey,
    base_url: String,
    voice_id: String,
    model_id: String,
}

impl ElevenLabsSpeechClient {
    pub fn new(api_key: ApiKey) -> Self {
        Self::from_config(api_key, &VoiceConfig::default())
    }

    pub fn from_config(api_key: ApiKey, config: &VoiceConfig) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: config.base_url.clone(),
            voice_id: config.voice_id.clone(),
            model_id: config.model_id.clone(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_voice_id(mut self, voice_id: String) -> Self {
        self.voice_id = voice_id;
        self
    }
}

#[derive(Serialize)]
struct ElevenLabsRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

fn classify_failure(status: StatusCode, body: String) -> SynthesisError {
    if status == StatusCode::UNAUTHORIZED {
        SynthesisError::Unauthorized
    } else if status == StatusCode::TOO_MANY_REQUESTS || body.contains("quota") {
        SynthesisError::QuotaExhausted
    } else {
        SynthesisError::Api {
            status: status.as_u16(),
            body,
        }
    }
}

impl SpeechClient for ElevenLabsSpeechClient {
    fn synthesize(&self, request: SpeechRequest) -> BoxFuture<'_, Result<Bytes, SynthesisError>> {
        let this = self.clone();
        async move {
            let url = format!(
                "{}/text-to-speech/{}",
                this.base_url.trim_end_matches('/'),
                this.voice_id
            );

            let body = ElevenLabsRequest {
                text: &request.text,
                model_id: &this.model_id,
                voice_settings: request.settings,
            };

            tracing::debug!(
                target: LOG_TARGET,
                voice_id = %this.voice_id,
                stability = request.settings.stability,
                similarity_boost = request.settings.similarity_boost,
                "requesting speech"
            );

            let response = this
                .client
                .post(&url)
                .header("xi-api-key", this.api_key.expose())
                .header("Accept", "audio/mpeg")
                .json(&body)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(classify_failure(status, body));
            }

            let audio = response.bytes().await?;
            if audio.is_empty() {
                return Err(SynthesisError::EmptyAudio);
            }
            Ok(audio)
        }
        .boxed()
    }
}
