mod disabled;
mod elevenlabs;
mod synthesizer;

use crate::emotion::{EmotionLabel, EmotionRecord};
use bytes::Bytes;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use disabled::DisabledSpeechClient;
pub use elevenlabs::ElevenLabsSpeechClient;
pub use synthesizer::VoiceSynthesizer;

pub const WORDS_PER_MINUTE: f64 = 150.0;
pub const MIN_ESTIMATED_DURATION_SECS: f64 = 3.0;

const MIN_STABILITY: f64 = 0.1;
const MAX_STABILITY: f64 = 0.9;

/// Synthesis parameters sent upstream, derived from the emotion record.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct VoiceSettings {
    pub stability: f64,
    pub similarity_boost: f64,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.5,
        }
    }
}

impl VoiceSettings {
    /// Expressive emotions get lower stability; intensity lowers it further.
    pub fn for_emotion(emotion: Option<&EmotionRecord>) -> Self {
        let Some(emotion) = emotion else {
            return Self::default();
        };

        let (stability, similarity_boost) = match emotion.primary_emotion {
            EmotionLabel::Joy => (0.3, 0.7),
            EmotionLabel::Sadness => (0.8, 0.4),
            EmotionLabel::Anger => (0.2, 0.6),
            EmotionLabel::Fear => (0.7, 0.3),
            _ => (0.5, 0.5),
        };

        let intensity_factor = emotion
            .intensity
            .map_or(0.0, |i| f64::from(i.get()) / 10.0);
        let stability =
            (stability * (1.0 - intensity_factor * 0.5)).clamp(MIN_STABILITY, MAX_STABILITY);

        Self {
            stability,
            similarity_boost,
        }
    }
}

/// Reading-speed estimate in seconds, never below three seconds.
pub fn estimate_duration_secs(text: &str) -> f64 {
    let words = text.split_whitespace().count() as f64;
    (words / WORDS_PER_MINUTE * 60.0).max(MIN_ESTIMATED_DURATION_SECS)
}

#[derive(Clone, Debug, PartialEq)]
pub struct SpeechRequest {
    pub text: String,
    pub settings: VoiceSettings,
}

#[derive(thiserror::Error, Debug)]
pub enum SynthesisError {
    #[error("speech synthesis is not configured")]
    NotConfigured,

    #[error("speech service rejected the credentials")]
    Unauthorized,

    #[error("speech service quota exhausted")]
    QuotaExhausted,

    #[error("speech service returned http {status}: {body}")]
    Api { status: u16, body: String },

    #[error("speech request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("speech service returned no audio")]
    EmptyAudio,

    #[error("failed to persist audio: {0}")]
    Io(#[from] std::io::Error),
}

pub trait SpeechClient: Send + Sync {
    /// Returns encoded audio (mp3) bytes.
    fn synthesize(&self, request: SpeechRequest) -> BoxFuture<'_, Result<Bytes, SynthesisError>>;
}

/// Outcome of the voice stage. `Fallback` tells the caller to speak the text locally.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(into = "AudioResultWire", try_from = "AudioResultWire")]
pub enum AudioResult {
    Synthesized {
        audio_path: PathBuf,
        duration_secs: f64,
    },
    Fallback {
        text: String,
        emotion: Option<EmotionRecord>,
    },
}

impl AudioResult {
    pub fn fallback(text: &str, emotion: Option<&EmotionRecord>) -> Self {
        AudioResult::Fallback {
            text: text.to_owned(),
            emotion: emotion.cloned(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, AudioResult::Fallback { .. })
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AudioResultWire {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fallback: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    audio_path: Option<PathBuf>,
    #[serde(default, alias = "durationSeconds", skip_serializing_if = "Option::is_none")]
    duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    emotion: Option<EmotionRecord>,
}

impl From<AudioResult> for AudioResultWire {
    fn from(result: AudioResult) -> Self {
        match result {
            AudioResult::Synthesized {
                audio_path,
                duration_secs,
            } => Self {
                success: true,
                fallback: None,
                audio_path: Some(audio_path),
                duration: Some(duration_secs),
                text: None,
                emotion: None,
            },
            AudioResult::Fallback { text, emotion } => Self {
                success: false,
                fallback: Some(true),
                audio_path: None,
                duration: None,
                text: Some(text),
                emotion,
            },
        }
    }
}

impl TryFrom<AudioResultWire> for AudioResult {
    type Error = String;

    fn try_from(wire: AudioResultWire) -> Result<Self, Self::Error> {
        if !wire.success {
            return Ok(AudioResult::Fallback {
                text: wire.text.unwrap_or_default(),
                emotion: wire.emotion,
            });
        }
        match (wire.audio_path, wire.duration) {
            (Some(audio_path), Some(duration_secs)) => Ok(AudioResult::Synthesized {
                audio_path,
                duration_secs,
            }),
            (None, _) => Err("successful audio result is missing audioPath".to_owned()),
            (_, None) => Err("successful audio result is missing duration".to_owned()),
        }
    }
}
