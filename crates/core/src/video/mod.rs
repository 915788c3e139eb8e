use ffmpeg_sidecar::{download, ffprobe::ffprobe_path, paths::ffmpeg_path};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

const LOG_TARGET: &str = "video::ffmpeg";

pub const FRAME_RATE: u32 = 30;
pub const SILENT_VIDEO_DURATION: Duration = Duration::from_secs(10);
pub const VIDEO_CODEC: &str = "libx264";
pub const PIXEL_FORMAT: &str = "yuv420p";
pub const AUDIO_CODEC: &str = "aac";

#[derive(Clone, Debug, PartialEq)]
pub struct AudioTrack {
    pub path: PathBuf,
    /// Word-count estimate from the voice stage, used when the file cannot be measured.
    pub estimated_duration: Option<Duration>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AssemblyJob {
    /// image2 input pattern, e.g. `<dir>/frame_%05d.png`.
    pub frames_pattern: PathBuf,
    pub audio: Option<AudioTrack>,
    pub output: PathBuf,
}

#[derive(thiserror::Error, Debug)]
pub enum EncodingError {
    #[error("no frames found in {0}")]
    MissingFrames(PathBuf),

    #[error("ffmpeg unavailable: {0}")]
    FfmpegUnavailable(String),

    #[error("ffmpeg io failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("ffmpeg failed: exit_code={code:?} stderr={stderr}")]
    Failed { code: Option<i32>, stderr: String },
}

pub trait VideoAssembler: Send + Sync {
    /// Encodes the job and returns the duration cap that was applied.
    fn assemble(&self, job: AssemblyJob) -> BoxFuture<'_, Result<Duration, EncodingError>>;
}

/// Measured audio length wins, then the estimate, then the silent default.
pub fn resolve_target_duration(measured: Option<Duration>, audio: Option<&AudioTrack>) -> Duration {
    match audio {
        Some(track) => measured
            .or(track.estimated_duration)
            .unwrap_or(SILENT_VIDEO_DURATION),
        None => SILENT_VIDEO_DURATION,
    }
}

/// The looped frame input never ends on its own, so the clip is bounded by
/// `-shortest` against the audio (when present) and by `-t`.
pub fn build_ffmpeg_args(job: &AssemblyJob, target: Duration) -> Vec<OsString> {
    let rate = FRAME_RATE.to_string();
    let mut args: Vec<OsString> = [
        "-hide_banner",
        "-nostdin",
        "-loglevel",
        "error",
        "-y",
        "-f",
        "image2",
        "-loop",
        "1",
        "-framerate",
        rate.as_str(),
        "-start_number",
        "0",
        "-i",
    ]
    .iter()
    .map(OsString::from)
    .collect();
    args.push(job.frames_pattern.clone().into_os_string());

    if let Some(audio) = &job.audio {
        args.push("-i".into());
        args.push(audio.path.clone().into_os_string());
    }

    args.extend(["-map", "0:v:0"].map(OsString::from));
    if job.audio.is_some() {
        args.extend(["-map", "1:a:0"].map(OsString::from));
    }

    args.extend(["-c:v", VIDEO_CODEC, "-pix_fmt", PIXEL_FORMAT, "-r"].map(OsString::from));
    args.push(rate.into());

    if job.audio.is_some() {
        args.extend(["-c:a", AUDIO_CODEC, "-shortest"].map(OsString::from));
    }

    args.push("-t".into());
    args.push(format!("{:.3}", target.as_secs_f64()).into());
    args.push(job.output.clone().into_os_string());
    args
}

fn first_frame_exists(pattern: &Path) -> bool {
    pattern
        .parent()
        .map(|dir| dir.join(crate::render::frame_file_name(0)).is_file())
        .unwrap_or(false)
}

#[derive(Clone, Debug)]
pub struct FfmpegVideoAssembler {
    auto_download: bool,
}

impl Default for FfmpegVideoAssembler {
    fn default() -> Self {
        Self {
            auto_download: true,
        }
    }
}

impl FfmpegVideoAssembler {
    pub fn new(auto_download: bool) -> Self {
        Self { auto_download }
    }

    async fn ensure_ffmpeg_available(&self) -> Result<(), EncodingError> {
        if !self.auto_download {
            return Ok(());
        }
        tokio::task::spawn_blocking(|| download::auto_download().map_err(|e| e.to_string()))
            .await
            .map_err(|e| EncodingError::FfmpegUnavailable(e.to_string()))?
            .map_err(EncodingError::FfmpegUnavailable)
    }

    async fn measure_duration(path: &Path) -> Option<Duration> {
        let output = tokio::process::Command::new(ffprobe_path())
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=duration",
                "-of",
                "default=noprint_wrappers=1:nokey=1",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await;

        match output {
            Ok(out) if out.status.success() => {
                let secs = String::from_utf8_lossy(&out.stdout).trim().parse::<f64>().ok()?;
                Duration::try_from_secs_f64(secs).ok()
            }
            Ok(out) => {
                tracing::warn!(
                    target: LOG_TARGET,
                    path = %path.display(),
                    stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                    "ffprobe could not measure audio"
                );
                None
            }
            Err(e) => {
                tracing::warn!(target: LOG_TARGET, error = %e, "ffprobe unavailable");
                None
            }
        }
    }
}

impl VideoAssembler for FfmpegVideoAssembler {
    fn assemble(&self, job: AssemblyJob) -> BoxFuture<'_, Result<Duration, EncodingError>> {
        async move {
            if !first_frame_exists(&job.frames_pattern) {
                let dir = job
                    .frames_pattern
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_default();
                return Err(EncodingError::MissingFrames(dir));
            }

            self.ensure_ffmpeg_available().await?;

            let measured = match &job.audio {
                Some(track) => Self::measure_duration(&track.path).await,
                None => None,
            };
            let target = resolve_target_duration(measured, job.audio.as_ref());

            if let Some(parent) = job.output.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            tracing::debug!(
                target: LOG_TARGET,
                output = %job.output.display(),
                has_audio = job.audio.is_some(),
                measured_secs = measured.map(|d| d.as_secs_f64()),
                target_secs = target.as_secs_f64(),
                "encoding video"
            );

            let output = tokio::process::Command::new(ffmpeg_path())
                .args(build_ffmpeg_args(&job, target))
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .output()
                .await?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
                tracing::error!(target: LOG_TARGET, code = ?output.status.code(), %stderr, "ffmpeg failed");
                return Err(EncodingError::Failed {
                    code: output.status.code(),
                    stderr,
                });
            }

            tracing::info!(target: LOG_TARGET, output = %job.output.display(), "video encoded");
            Ok(target)
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(audio: Option<AudioTrack>) -> AssemblyJob {
        AssemblyJob {
            frames_pattern: PathBuf::from("/tmp/frames_1/frame_%05d.png"),
            audio,
            output: PathBuf::from("/tmp/video/video_1.mp4"),
        }
    }

    fn track(estimate: Option<u64>) -> AudioTrack {
        AudioTrack {
            path: PathBuf::from("/tmp/audio/voice_1.mp3"),
            estimated_duration: estimate.map(Duration::from_secs),
        }
    }

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn target_duration_prefers_measurement() {
        let audio = track(Some(4));
        assert_eq!(
            resolve_target_duration(Some(Duration::from_millis(5200)), Some(&audio)),
            Duration::from_millis(5200)
        );
        assert_eq!(
            resolve_target_duration(None, Some(&audio)),
            Duration::from_secs(4)
        );
        assert_eq!(
            resolve_target_duration(None, Some(&track(None))),
            SILENT_VIDEO_DURATION
        );
        assert_eq!(resolve_target_duration(None, None), SILENT_VIDEO_DURATION);
    }

    #[test]
    fn silent_args_cap_duration_without_shortest() {
        let args = strings(&build_ffmpeg_args(&job(None), Duration::from_secs(10)));

        assert!(has_pair(&args, "-framerate", "30"));
        assert!(has_pair(&args, "-i", "/tmp/frames_1/frame_%05d.png"));
        assert!(has_pair(&args, "-c:v", "libx264"));
        assert!(has_pair(&args, "-pix_fmt", "yuv420p"));
        assert!(has_pair(&args, "-r", "30"));
        assert!(has_pair(&args, "-t", "10.000"));
        assert!(!args.contains(&"-shortest".to_owned()));
        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 1);
        assert_eq!(args.last().map(String::as_str), Some("/tmp/video/video_1.mp4"));
    }

    #[test]
    fn audio_args_mux_second_input() {
        let args = strings(&build_ffmpeg_args(
            &job(Some(track(Some(3)))),
            Duration::from_millis(3250),
        ));

        assert!(has_pair(&args, "-i", "/tmp/audio/voice_1.mp3"));
        assert!(has_pair(&args, "-map", "1:a:0"));
        assert!(has_pair(&args, "-c:a", "aac"));
        assert!(args.contains(&"-shortest".to_owned()));
        assert!(has_pair(&args, "-t", "3.250"));

        let loop_at = args.iter().position(|a| a == "-loop").unwrap();
        let first_input = args.iter().position(|a| a == "-i").unwrap();
        assert!(loop_at < first_input);
    }

    #[tokio::test]
    async fn missing_frames_fail_before_encoding() {
        let dir = tempfile::tempdir().unwrap();
        let assembler = FfmpegVideoAssembler::new(false);
        let err = assembler
            .assemble(AssemblyJob {
                frames_pattern: dir.path().join(crate::render::FRAME_PATTERN),
                audio: None,
                output: dir.path().join("out.mp4"),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, EncodingError::MissingFrames(p) if p == dir.path()));
    }

    #[tokio::test]
    #[ignore]
    async fn ffmpeg_encode_smoke_ignored() {
        // Requires ffmpeg on PATH or a successful download.
        use crate::emotion::{EmotionLabel, EmotionRecord, Intensity};
        use crate::render::FrameRenderer;

        let dir = tempfile::tempdir().unwrap();
        let record = EmotionRecord::new(EmotionLabel::Joy, Intensity::new(5));
        let frames = FrameRenderer::new()
            .render_to("smoke", &record, &dir.path().join("frames"))
            .await
            .unwrap();
        let output = dir.path().join("out.mp4");

        let target = FfmpegVideoAssembler::default()
            .assemble(AssemblyJob {
                frames_pattern: frames.input_pattern(),
                audio: None,
                output: output.clone(),
            })
            .await
            .unwrap();
        assert_eq!(target, SILENT_VIDEO_DURATION);
        assert!(output.metadata().unwrap().len() > 0);
    }
}
