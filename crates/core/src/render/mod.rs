mod canvas;

use crate::emotion::{EmotionLabel, EmotionRecord};
use canvas::{parse_color, Canvas};
use image::{ImageFormat, Rgb, RgbImage};
use serde::Serialize;
use std::f32::consts::PI;
use std::path::{Path, PathBuf};

const LOG_TARGET: &str = "render";

pub const FRAME_COUNT: usize = 60;
pub const FRAME_WIDTH: u32 = 1280;
pub const FRAME_HEIGHT: u32 = 720;
/// ffmpeg image2 pattern matching [`frame_file_name`].
pub const FRAME_PATTERN: &str = "frame_%05d.png";

const TEXT_CELL: f32 = 16.0;
const CAPTION_CELL: f32 = 12.0;
const LINE_HEIGHT: f32 = 40.0;
const CAPTION_BOTTOM_OFFSET: f32 = 50.0;
const PULSE_AMPLITUDE: f32 = 0.2;
const WAVE_AMPLITUDE: f32 = 15.0;
const WAVE_CHAR_PHASE: f32 = 0.2;

const DEFAULT_BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);
const DEFAULT_FOREGROUND: Rgb<u8> = Rgb([255, 255, 255]);

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AnimationStyle {
    Pulse,
    Fade,
    Wave,
    Simple,
}

impl AnimationStyle {
    pub fn for_emotion(label: EmotionLabel) -> Self {
        match label {
            EmotionLabel::Joy => AnimationStyle::Pulse,
            EmotionLabel::Sadness => AnimationStyle::Fade,
            EmotionLabel::Anger => AnimationStyle::Wave,
            _ => AnimationStyle::Simple,
        }
    }
}

pub fn frame_file_name(index: usize) -> String {
    format!("frame_{index:05}.png")
}

/// Rendered frames on disk, in playback order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameSequence {
    dir: PathBuf,
    frames: Vec<PathBuf>,
}

impl FrameSequence {
    pub fn frames(&self) -> &[PathBuf] {
        &self.frames
    }

    pub fn input_pattern(&self) -> PathBuf {
        self.dir.join(FRAME_PATTERN)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    #[error("frame io failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame encoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("render task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Clone, Copy, Debug)]
struct Colors {
    background: Rgb<u8>,
    foreground: Rgb<u8>,
}

impl Colors {
    fn from_record(emotion: &EmotionRecord) -> Self {
        let pick = |raw: Option<&str>, default: Rgb<u8>| {
            raw.and_then(|c| {
                let parsed = parse_color(c);
                if parsed.is_none() {
                    tracing::debug!(target: LOG_TARGET, color = c, "unparseable palette colour, using default");
                }
                parsed
            })
            .unwrap_or(default)
        };
        Self {
            background: pick(emotion.background(), DEFAULT_BACKGROUND),
            foreground: pick(emotion.foreground(), DEFAULT_FOREGROUND),
        }
    }
}

/// Draws the animated text frames. Each frame depends only on its index.
#[derive(Clone, Debug, Default)]
pub struct FrameRenderer;

impl FrameRenderer {
    pub fn new() -> Self {
        Self
    }

    pub fn render_frame(&self, text: &str, emotion: &EmotionRecord, index: usize) -> RgbImage {
        let colors = Colors::from_record(emotion);
        let style = AnimationStyle::for_emotion(emotion.primary_emotion);
        let progress = index as f32 / FRAME_COUNT as f32;

        let mut canvas = Canvas::new(FRAME_WIDTH, FRAME_HEIGHT, colors.background);
        let (cx, cy) = (canvas.width() / 2.0, canvas.height() / 2.0);
        let fg = colors.foreground;

        match style {
            AnimationStyle::Pulse => {
                let scale = 1.0 + PULSE_AMPLITUDE * (progress * 4.0 * PI).sin();
                canvas.draw_text_centered(&single_line(text), cx, cy, TEXT_CELL * scale, fg, 1.0);
            }
            AnimationStyle::Fade => {
                let opacity = (progress * PI).sin().max(0.0);
                canvas.draw_text_centered(&single_line(text), cx, cy, TEXT_CELL, fg, opacity);
            }
            AnimationStyle::Wave => {
                let lines: Vec<&str> = text.lines().collect();
                let start_y = block_top(cy, lines.len());
                for (i, line) in lines.iter().enumerate() {
                    let baseline = start_y + i as f32 * LINE_HEIGHT;
                    let mut x = cx - line.chars().count() as f32 * TEXT_CELL / 2.0;
                    for (j, ch) in line.chars().enumerate() {
                        let offset =
                            (progress * 4.0 * PI + j as f32 * WAVE_CHAR_PHASE).sin() * WAVE_AMPLITUDE;
                        canvas.draw_glyph(
                            ch,
                            x - TEXT_CELL / 2.0,
                            baseline + offset - TEXT_CELL / 2.0,
                            TEXT_CELL,
                            fg,
                            1.0,
                        );
                        x += TEXT_CELL;
                    }
                }
            }
            AnimationStyle::Simple => {
                let lines: Vec<&str> = text.lines().collect();
                let start_y = block_top(cy, lines.len());
                for (i, line) in lines.iter().enumerate() {
                    canvas.draw_text_centered(
                        line,
                        cx,
                        start_y + i as f32 * LINE_HEIGHT,
                        TEXT_CELL,
                        fg,
                        1.0,
                    );
                }
            }
        }

        canvas.draw_text_centered(
            emotion.primary_emotion.as_str(),
            cx,
            canvas.height() - CAPTION_BOTTOM_OFFSET,
            CAPTION_CELL,
            fg,
            1.0,
        );

        canvas.into_image()
    }

    /// Writes all [`FRAME_COUNT`] frames as PNGs into `out_dir`.
    pub async fn render_to(
        &self,
        text: &str,
        emotion: &EmotionRecord,
        out_dir: &Path,
    ) -> Result<FrameSequence, RenderError> {
        let this = self.clone();
        let text = text.to_owned();
        let emotion = emotion.clone();
        let dir = out_dir.to_path_buf();

        tracing::debug!(
            target: LOG_TARGET,
            style = ?AnimationStyle::for_emotion(emotion.primary_emotion),
            dir = %dir.display(),
            "rendering frames"
        );

        tokio::task::spawn_blocking(move || this.write_frames(&text, &emotion, dir)).await?
    }

    fn write_frames(
        &self,
        text: &str,
        emotion: &EmotionRecord,
        dir: PathBuf,
    ) -> Result<FrameSequence, RenderError> {
        std::fs::create_dir_all(&dir)?;
        let mut frames = Vec::with_capacity(FRAME_COUNT);
        for index in 0..FRAME_COUNT {
            let path = dir.join(frame_file_name(index));
            self.render_frame(text, emotion, index)
                .save_with_format(&path, ImageFormat::Png)?;
            frames.push(path);
        }
        tracing::info!(target: LOG_TARGET, count = frames.len(), "frames rendered");
        Ok(FrameSequence { dir, frames })
    }
}

fn single_line(text: &str) -> String {
    text.lines().collect::<Vec<_>>().join(" ")
}

fn block_top(center_y: f32, line_count: usize) -> f32 {
    center_y - line_count.saturating_sub(1) as f32 * LINE_HEIGHT / 2.0
}
