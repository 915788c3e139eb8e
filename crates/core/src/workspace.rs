//! On-disk layout for generated assets.
//!
//! Audio and video files live in flat per-type directories and are named by
//! creation time in milliseconds. Frames are written to a per-request
//! directory under the frames root that is removed when the request ends.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::TempDir;

const LOG_TARGET: &str = "workspace";

pub fn timestamp_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetDirs {
    root: PathBuf,
}

impl AssetDirs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.root.join("audio")
    }

    pub fn video_dir(&self) -> PathBuf {
        self.root.join("video")
    }

    pub fn frames_dir(&self) -> PathBuf {
        self.root.join("frames")
    }

    pub async fn ensure(&self) -> io::Result<()> {
        for dir in [self.audio_dir(), self.video_dir(), self.frames_dir()] {
            tokio::fs::create_dir_all(&dir).await?;
        }
        Ok(())
    }

    pub fn new_video_path(&self) -> PathBuf {
        self.video_dir()
            .join(format!("video_{}.mp4", timestamp_millis()))
    }

    /// Resolves a client-supplied audio path, accepting it only if it points at an
    /// existing file inside the audio directory.
    pub async fn resolve_audio_path(&self, candidate: &Path) -> Option<PathBuf> {
        let audio_dir = tokio::fs::canonicalize(self.audio_dir()).await.ok()?;
        let resolved = match tokio::fs::canonicalize(candidate).await {
            Ok(path) => path,
            Err(_) => tokio::fs::canonicalize(self.audio_dir().join(candidate.file_name()?))
                .await
                .ok()?,
        };
        let is_file = tokio::fs::metadata(&resolved)
            .await
            .is_ok_and(|m| m.is_file());
        if resolved.starts_with(&audio_dir) && is_file {
            Some(resolved)
        } else {
            tracing::warn!(
                target: LOG_TARGET,
                path = %candidate.display(),
                "ignoring audio path outside the audio directory"
            );
            None
        }
    }
}

/// Isolated frames directory for one request. Deleted on drop.
#[derive(Debug)]
pub struct RequestWorkspace {
    dir: TempDir,
}

impl RequestWorkspace {
    pub async fn create(frames_root: &Path) -> io::Result<Self> {
        tokio::fs::create_dir_all(frames_root).await?;
        let prefix = format!("frames_{}_", timestamp_millis());
        let root = frames_root.to_path_buf();
        let dir = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new().prefix(&prefix).tempdir_in(root)
        })
        .await
        .map_err(io::Error::other)??;
        tracing::debug!(target: LOG_TARGET, path = %dir.path().display(), "request workspace created");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn workspaces_are_isolated_and_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let frames = root.path().join("frames");

        let a = RequestWorkspace::create(&frames).await.unwrap();
        let b = RequestWorkspace::create(&frames).await.unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.path().starts_with(&frames));

        let kept = a.path().to_path_buf();
        std::fs::write(kept.join("frame_00000.png"), b"x").unwrap();
        drop(a);
        assert!(!kept.exists());
        assert!(b.path().exists());
    }

    #[tokio::test]
    async fn ensure_creates_all_asset_dirs() {
        let root = tempfile::tempdir().unwrap();
        let dirs = AssetDirs::new(root.path().join("assets"));
        dirs.ensure().await.unwrap();

        assert!(dirs.audio_dir().is_dir());
        assert!(dirs.video_dir().is_dir());
        assert!(dirs.frames_dir().is_dir());

        let video = dirs.new_video_path();
        assert!(video.starts_with(dirs.video_dir()));
        let name = video.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("video_") && name.ends_with(".mp4"));
    }

    #[tokio::test]
    async fn audio_paths_are_confined_to_audio_dir() {
        let root = tempfile::tempdir().unwrap();
        let dirs = AssetDirs::new(root.path());
        dirs.ensure().await.unwrap();

        let inside = dirs.audio_dir().join("voice_1.mp3");
        std::fs::write(&inside, b"mp3").unwrap();
        let outside = root.path().join("secret.mp3");
        std::fs::write(&outside, b"nope").unwrap();

        assert!(dirs.resolve_audio_path(&inside).await.is_some());
        assert!(dirs.resolve_audio_path(Path::new("voice_1.mp3")).await.is_some());
        assert!(dirs.resolve_audio_path(&outside).await.is_none());
        assert!(dirs
            .resolve_audio_path(&dirs.audio_dir().join("../secret.mp3"))
            .await
            .is_none());
        assert!(dirs
            .resolve_audio_path(&dirs.audio_dir().join("missing.mp3"))
            .await
            .is_none());
        assert!(dirs.resolve_audio_path(&dirs.audio_dir()).await.is_none());
    }
}
