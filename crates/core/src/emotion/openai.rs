use crate::config::{ApiKey, LanguageModelConfig};
use crate::emotion::{ClassificationError, EmotionClassifier, EmotionRecord};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const LOG_TARGET: &str = "emotion::openai";

const SYSTEM_PROMPT: &str = "You are an emotion detection specialist. Analyze the text and return \
a JSON object with the following properties: primaryEmotion (one of joy, sadness, anger, fear, \
surprise, disgust, neutral), intensity (integer 1-10), visualStyle (a style that matches the \
emotion), colorPalette (array of hex colors that match the emotion, background first, text \
color second), and briefDescription (1-2 sentences explaining the emotional tone).";

#[derive(Clone)]
pub struct OpenAiEmotionClassifier {
    client: Client,
    api_key: ApiKey,
    base_url: String,
    model: String,
}

impl OpenAiEmotionClassifier {
    pub fn new(api_key: ApiKey) -> Self {
        Self::from_config(api_key, &LanguageModelConfig::default())
    }

    pub fn from_config(api_key: ApiKey, config: &LanguageModelConfig) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: config.base_url.clone(),
            model: config.model.clone(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    async fn request_completion(
        &self,
        url: &str,
        request: &ChatRequest<'_>,
    ) -> Result<ChatResponse, ClassificationError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(self.api_key.expose())
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(target: LOG_TARGET, status, "language model request rejected");
            return Err(ClassificationError::Api { status, body });
        }

        Ok(response.json().await?)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// Slices from the first `{` to the last `}` so fenced or chatty replies still parse.
fn json_object_slice(content: &str) -> &str {
    match (content.find('{'), content.rfind('}')) {
        (Some(start), Some(end)) if start < end => &content[start..=end],
        _ => content,
    }
}

const REQUIRED_FIELDS: [&str; 2] = ["primaryEmotion", "intensity"];

/// Unlike client input, a model reply must carry both the label and the intensity.
pub(crate) fn parse_record(content: &str) -> Result<EmotionRecord, ClassificationError> {
    let value: serde_json::Value = serde_json::from_str(json_object_slice(content))
        .map_err(ClassificationError::InvalidRecord)?;
    for field in REQUIRED_FIELDS {
        if matches!(value.get(field), None | Some(serde_json::Value::Null)) {
            return Err(ClassificationError::InvalidRecord(
                <serde_json::Error as serde::de::Error>::missing_field(field),
            ));
        }
    }
    serde_json::from_value(value).map_err(ClassificationError::InvalidRecord)
}

impl EmotionClassifier for OpenAiEmotionClassifier {
    fn classify(&self, text: String) -> BoxFuture<'_, Result<EmotionRecord, ClassificationError>> {
        let this = self.clone();
        async move {
            if text.trim().is_empty() {
                return Err(ClassificationError::EmptyText);
            }

            let url = format!("{}/chat/completions", this.base_url.trim_end_matches('/'));
            let request = ChatRequest {
                model: &this.model,
                messages: [
                    ChatMessage {
                        role: "system",
                        content: SYSTEM_PROMPT,
                    },
                    ChatMessage {
                        role: "user",
                        content: &text,
                    },
                ],
                response_format: ResponseFormat {
                    kind: "json_object",
                },
            };

            tracing::debug!(target: LOG_TARGET, model = %this.model, chars = text.len(), "classifying text");

            let completion = this.request_completion(&url, &request).await?;
            let content = completion
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.message.content)
                .filter(|content| !content.trim().is_empty())
                .ok_or(ClassificationError::EmptyResponse)?;

            let record = parse_record(&content).inspect_err(|e| {
                tracing::warn!(target: LOG_TARGET, error = %e, "unparseable emotion record");
            })?;

            tracing::info!(
                target: LOG_TARGET,
                emotion = %record.primary_emotion,
                intensity = record.intensity.map(|i| i.get()),
                "text classified"
            );
            Ok(record)
        }
        .boxed()
    }
}
