use crate::emotion::{ClassificationError, EmotionClassifier, EmotionRecord};
use crate::render::{FrameRenderer, FrameSequence, RenderError};
use crate::video::{AssemblyJob, AudioTrack, EncodingError, VideoAssembler};
use crate::voice::{AudioResult, SpeechClient, VoiceSynthesizer};
use crate::workspace::{AssetDirs, RequestWorkspace};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const LOG_TARGET: &str = "pipeline";

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("{0}")]
    Validation(&'static str),

    #[error("emotion classification failed: {0}")]
    Classification(#[from] ClassificationError),

    #[error("frame rendering failed: {0}")]
    Render(#[from] RenderError),

    #[error("video encoding failed: {0}")]
    Encoding(#[from] EncodingError),

    #[error("workspace io failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoResult {
    success: bool,
    pub video_path: PathBuf,
}

impl VideoResult {
    pub fn new(video_path: PathBuf) -> Self {
        Self {
            success: true,
            video_path,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PipelineOutput {
    pub emotion: EmotionRecord,
    pub audio: AudioResult,
    pub video: VideoResult,
}

fn require_text(text: &str) -> Result<(), PipelineError> {
    if text.trim().is_empty() {
        return Err(PipelineError::Validation("Text is required"));
    }
    Ok(())
}

/// text -> emotion -> (voice, frames) -> video. Holds no per-request state.
#[derive(Clone)]
pub struct Pipeline {
    classifier: Arc<dyn EmotionClassifier>,
    voice: VoiceSynthesizer,
    renderer: FrameRenderer,
    assembler: Arc<dyn VideoAssembler>,
    assets: AssetDirs,
}

impl Pipeline {
    pub fn new(
        classifier: Arc<dyn EmotionClassifier>,
        speech: Arc<dyn SpeechClient>,
        assembler: Arc<dyn VideoAssembler>,
        assets: AssetDirs,
    ) -> Self {
        Self {
            classifier,
            voice: VoiceSynthesizer::new(speech, assets.audio_dir()),
            renderer: FrameRenderer::new(),
            assembler,
            assets,
        }
    }

    pub fn assets(&self) -> &AssetDirs {
        &self.assets
    }

    pub async fn classify(&self, text: &str) -> Result<EmotionRecord, PipelineError> {
        require_text(text)?;
        Ok(self.classifier.classify(text.to_owned()).await?)
    }

    pub async fn synthesize(
        &self,
        text: &str,
        emotion: Option<&EmotionRecord>,
    ) -> Result<AudioResult, PipelineError> {
        require_text(text)?;
        Ok(self.voice.synthesize(text, emotion).await)
    }

    /// Renders and encodes a video for an already classified text. Audio is
    /// muxed only when `audio` points at a file inside the audio directory.
    pub async fn generate_video(
        &self,
        text: &str,
        emotion: &EmotionRecord,
        audio: Option<&AudioResult>,
    ) -> Result<VideoResult, PipelineError> {
        require_text(text)?;
        let workspace = RequestWorkspace::create(&self.assets.frames_dir()).await?;
        let frames = self.renderer.render_to(text, emotion, workspace.path()).await?;
        self.assemble(&frames, audio).await
    }

    pub async fn run(&self, text: &str) -> Result<PipelineOutput, PipelineError> {
        require_text(text)?;
        let emotion = self.classify(text).await?;

        let workspace = RequestWorkspace::create(&self.assets.frames_dir()).await?;
        let (audio, frames) = tokio::join!(
            self.voice.synthesize(text, Some(&emotion)),
            self.renderer.render_to(text, &emotion, workspace.path()),
        );
        let frames = frames?;
        let video = self.assemble(&frames, Some(&audio)).await?;

        tracing::info!(
            target: LOG_TARGET,
            emotion = %emotion.primary_emotion,
            fallback_audio = audio.is_fallback(),
            video = %video.video_path.display(),
            "pipeline finished"
        );

        Ok(PipelineOutput {
            emotion,
            audio,
            video,
        })
    }

    async fn assemble(
        &self,
        frames: &FrameSequence,
        audio: Option<&AudioResult>,
    ) -> Result<VideoResult, PipelineError> {
        let output = self.assets.new_video_path();
        let audio = match audio {
            Some(audio) => self.audio_track(audio).await,
            None => None,
        };
        let job = AssemblyJob {
            frames_pattern: frames.input_pattern(),
            audio,
            output: output.clone(),
        };
        self.assembler.assemble(job).await?;
        Ok(VideoResult::new(output))
    }

    async fn audio_track(&self, audio: &AudioResult) -> Option<AudioTrack> {
        let AudioResult::Synthesized {
            audio_path,
            duration_secs,
        } = audio
        else {
            return None;
        };
        let path = self.assets.resolve_audio_path(audio_path).await?;
        Some(AudioTrack {
            path,
            estimated_duration: Duration::try_from_secs_f64(*duration_secs)
                .ok()
                .filter(|d| !d.is_zero()),
        })
    }
}
