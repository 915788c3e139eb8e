use crate::emotion::EmotionRecord;
use crate::voice::{
    estimate_duration_secs, AudioResult, SpeechClient, SpeechRequest, SynthesisError,
    VoiceSettings,
};
use crate::workspace::timestamp_millis;
use std::path::PathBuf;
use std::sync::Arc;

const LOG_TARGET: &str = "voice";

/// Voice stage: tunes settings from the emotion, calls the speech client and
/// persists the audio. Never fails; errors become [`AudioResult::Fallback`].
#[derive(Clone)]
pub struct VoiceSynthesizer {
    client: Arc<dyn SpeechClient>,
    audio_dir: PathBuf,
}

impl VoiceSynthesizer {
    pub fn new(client: Arc<dyn SpeechClient>, audio_dir: PathBuf) -> Self {
        Self { client, audio_dir }
    }

    pub async fn synthesize(&self, text: &str, emotion: Option<&EmotionRecord>) -> AudioResult {
        match self.try_synthesize(text, emotion).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(target: LOG_TARGET, error = %e, "speech synthesis failed, signalling local fallback");
                AudioResult::fallback(text, emotion)
            }
        }
    }

    async fn try_synthesize(
        &self,
        text: &str,
        emotion: Option<&EmotionRecord>,
    ) -> Result<AudioResult, SynthesisError> {
        let request = SpeechRequest {
            text: text.to_owned(),
            settings: VoiceSettings::for_emotion(emotion),
        };
        let audio = self.client.synthesize(request).await?;
        if audio.is_empty() {
            return Err(SynthesisError::EmptyAudio);
        }

        tokio::fs::create_dir_all(&self.audio_dir).await?;
        let audio_path = self
            .audio_dir
            .join(format!("voice_{}.mp3", timestamp_millis()));
        tokio::fs::write(&audio_path, &audio).await?;

        tracing::info!(
            target: LOG_TARGET,
            path = %audio_path.display(),
            bytes = audio.len(),
            "audio saved"
        );

        Ok(AudioResult::Synthesized {
            audio_path,
            duration_secs: estimate_duration_secs(text),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emotion::{EmotionLabel, Intensity};
    use crate::voice::DisabledSpeechClient;
    use bytes::Bytes;
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingClient {
        seen: Mutex<Vec<SpeechRequest>>,
    }

    impl SpeechClient for RecordingClient {
        fn synthesize(
            &self,
            request: SpeechRequest,
        ) -> BoxFuture<'_, Result<Bytes, SynthesisError>> {
            async move {
                self.seen.lock().unwrap().push(request);
                Ok(Bytes::from_static(b"ID3fake"))
            }
            .boxed()
        }
    }

    struct QuotaClient;

    impl SpeechClient for QuotaClient {
        fn synthesize(
            &self,
            _request: SpeechRequest,
        ) -> BoxFuture<'_, Result<Bytes, SynthesisError>> {
            async { Err(SynthesisError::QuotaExhausted) }.boxed()
        }
    }

    fn joy() -> EmotionRecord {
        EmotionRecord::new(EmotionLabel::Joy, Intensity::new(7))
    }

    #[tokio::test]
    async fn writes_audio_and_reports_estimate() {
        let dir = tempfile::tempdir().unwrap();
        let client = Arc::new(RecordingClient::default());
        let synth = VoiceSynthesizer::new(client.clone(), dir.path().join("audio"));

        let result = synth.synthesize("I am so happy today", Some(&joy())).await;

        let (audio_path, duration_secs) = match result {
            AudioResult::Synthesized {
                audio_path,
                duration_secs,
            } => (audio_path, duration_secs),
            other => panic!("expected synthesized audio, got {other:?}"),
        };
        assert_eq!(std::fs::read(&audio_path).unwrap(), b"ID3fake");
        assert!(audio_path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("voice_"));
        assert_eq!(duration_secs, 3.0);

        let seen = client.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].settings, VoiceSettings::for_emotion(Some(&joy())));
    }

    #[tokio::test]
    async fn upstream_failure_becomes_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let synth = VoiceSynthesizer::new(Arc::new(QuotaClient), dir.path().to_path_buf());

        let result = synth.synthesize("hello", Some(&joy())).await;
        assert_eq!(
            result,
            AudioResult::Fallback {
                text: "hello".to_owned(),
                emotion: Some(joy()),
            }
        );
    }

    #[tokio::test]
    async fn unconfigured_client_falls_back_without_emotion() {
        let dir = tempfile::tempdir().unwrap();
        let synth = VoiceSynthesizer::new(Arc::new(DisabledSpeechClient), dir.path().to_path_buf());

        let result = synth.synthesize("hello", None).await;
        assert_eq!(result, AudioResult::fallback("hello", None));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
