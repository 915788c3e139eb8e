mod fixed;
mod openai;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use fixed::FixedEmotionClassifier;
pub use openai::OpenAiEmotionClassifier;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase", from = "Option<String>")]
pub enum EmotionLabel {
    Joy,
    Sadness,
    Anger,
    Fear,
    Surprise,
    Disgust,
    #[default]
    Neutral,
}

impl EmotionLabel {
    pub const ALL: [EmotionLabel; 7] = [
        EmotionLabel::Joy,
        EmotionLabel::Sadness,
        EmotionLabel::Anger,
        EmotionLabel::Fear,
        EmotionLabel::Surprise,
        EmotionLabel::Disgust,
        EmotionLabel::Neutral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionLabel::Joy => "joy",
            EmotionLabel::Sadness => "sadness",
            EmotionLabel::Anger => "anger",
            EmotionLabel::Fear => "fear",
            EmotionLabel::Surprise => "surprise",
            EmotionLabel::Disgust => "disgust",
            EmotionLabel::Neutral => "neutral",
        }
    }

    /// Case-insensitive; anything outside the label set is `Neutral`.
    pub fn parse_lenient(raw: &str) -> Self {
        let raw = raw.trim();
        Self::ALL
            .into_iter()
            .find(|label| label.as_str().eq_ignore_ascii_case(raw))
            .unwrap_or_default()
    }
}

impl From<Option<String>> for EmotionLabel {
    fn from(value: Option<String>) -> Self {
        value.as_deref().map(Self::parse_lenient).unwrap_or_default()
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Emotional intensity, always within `MIN..=MAX`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(try_from = "RawIntensity")]
pub struct Intensity(u8);

impl Intensity {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    pub fn new(value: u8) -> Self {
        Self(value.clamp(Self::MIN, Self::MAX))
    }

    pub fn from_f64(value: f64) -> Self {
        if !value.is_finite() {
            return Self(Self::MIN);
        }
        Self(value.round().clamp(f64::from(Self::MIN), f64::from(Self::MAX)) as u8)
    }

    pub fn get(&self) -> u8 {
        self.0
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawIntensity {
    Number(f64),
    Text(String),
}

impl TryFrom<RawIntensity> for Intensity {
    type Error = String;

    fn try_from(raw: RawIntensity) -> Result<Self, Self::Error> {
        match raw {
            RawIntensity::Number(n) => Ok(Intensity::from_f64(n)),
            RawIntensity::Text(s) => s
                .trim()
                .parse::<f64>()
                .map(Intensity::from_f64)
                .map_err(|_| format!("intensity is not a number: {s:?}")),
        }
    }
}

/// Classification result consumed by the voice and frame stages.
///
/// Deserialization is lenient so client-supplied records with missing fields
/// still drive the later stages; the classifier checks the required fields
/// itself.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmotionRecord {
    #[serde(default)]
    pub primary_emotion: EmotionLabel,
    /// `None` leaves voice settings unscaled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intensity: Option<Intensity>,
    #[serde(default)]
    pub visual_style: String,
    /// Index 0 is the background, index 1 the text colour.
    #[serde(default)]
    pub color_palette: Vec<String>,
    #[serde(default)]
    pub brief_description: String,
}

impl EmotionRecord {
    pub fn new(primary_emotion: EmotionLabel, intensity: Intensity) -> Self {
        Self {
            primary_emotion,
            intensity: Some(intensity),
            visual_style: String::new(),
            color_palette: Vec::new(),
            brief_description: String::new(),
        }
    }

    pub fn with_palette<I, S>(mut self, colors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.color_palette = colors.into_iter().map(Into::into).collect();
        self
    }

    pub fn background(&self) -> Option<&str> {
        self.color_palette.first().map(String::as_str)
    }

    pub fn foreground(&self) -> Option<&str> {
        self.color_palette.get(1).map(String::as_str)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ClassificationError {
    #[error("text must not be empty")]
    EmptyText,

    #[error("language model request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("language model returned http {status}: {body}")]
    Api { status: u16, body: String },

    #[error("language model returned no content")]
    EmptyResponse,

    #[error("language model returned an invalid emotion record: {0}")]
    InvalidRecord(#[source] serde_json::Error),
}

pub trait EmotionClassifier: Send + Sync {
    fn classify(&self, text: String) -> BoxFuture<'_, Result<EmotionRecord, ClassificationError>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn labels_parse_case_insensitively() {
        assert_eq!(EmotionLabel::parse_lenient("Joy"), EmotionLabel::Joy);
        assert_eq!(EmotionLabel::parse_lenient(" SADNESS "), EmotionLabel::Sadness);
        assert_eq!(EmotionLabel::parse_lenient("melancholy"), EmotionLabel::Neutral);
        assert_eq!(EmotionLabel::parse_lenient(""), EmotionLabel::Neutral);
    }

    #[test]
    fn intensity_is_clamped_and_rounded() {
        assert_eq!(Intensity::from_f64(0.0).get(), 1);
        assert_eq!(Intensity::from_f64(7.4).get(), 7);
        assert_eq!(Intensity::from_f64(7.6).get(), 8);
        assert_eq!(Intensity::from_f64(42.0).get(), 10);
        assert_eq!(Intensity::new(0).get(), 1);
    }

    #[test]
    fn record_deserializes_from_camel_case() {
        let record: EmotionRecord = serde_json::from_value(json!({
            "primaryEmotion": "joy",
            "intensity": 7,
            "visualStyle": "bright",
            "colorPalette": ["#FFD700", "#000000"],
            "briefDescription": "Upbeat."
        }))
        .unwrap();

        assert_eq!(record.primary_emotion, EmotionLabel::Joy);
        assert_eq!(record.intensity, Some(Intensity::new(7)));
        assert_eq!(record.background(), Some("#FFD700"));
        assert_eq!(record.foreground(), Some("#000000"));
    }

    #[test]
    fn record_accepts_string_intensity_and_missing_optionals() {
        let record: EmotionRecord = serde_json::from_value(json!({
            "primaryEmotion": "Fear",
            "intensity": "3"
        }))
        .unwrap();

        assert_eq!(record.primary_emotion, EmotionLabel::Fear);
        assert_eq!(record.intensity, Some(Intensity::new(3)));
        assert!(record.color_palette.is_empty());
        assert_eq!(record.background(), None);
    }

    #[test]
    fn record_tolerates_partial_client_input() {
        let record: EmotionRecord =
            serde_json::from_value(json!({ "primaryEmotion": "joy" })).unwrap();
        assert_eq!(record.primary_emotion, EmotionLabel::Joy);
        assert_eq!(record.intensity, None);

        let record: EmotionRecord =
            serde_json::from_value(json!({ "primaryEmotion": null, "intensity": null })).unwrap();
        assert_eq!(record, EmotionRecord::default());

        assert!(serde_json::from_value::<EmotionRecord>(
            json!({ "primaryEmotion": "joy", "intensity": "very" })
        )
        .is_err());
    }

    #[test]
    fn record_serializes_lowercase_label() {
        let record = EmotionRecord::new(EmotionLabel::Anger, Intensity::new(9));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["primaryEmotion"], "anger");
        assert_eq!(value["intensity"], 9);

        let value = serde_json::to_value(EmotionRecord::default()).unwrap();
        assert!(value.get("intensity").is_none());
    }
}
