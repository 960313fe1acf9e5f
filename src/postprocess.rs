// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Post-download steps: title-based rename and audio extraction.
//!
//! Both steps run after the transfer engine has returned. Their failures are
//! reported to the user but never undo a finished download.

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Longest title fragment appended to a file name, in bytes.
const MAX_TITLE_LEN: usize = 64;

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_]+").expect("non-word regex is valid"));

#[derive(Debug, Error)]
pub enum PostProcessError {
    #[error("ffmpeg not found in PATH")]
    FfmpegMissing,

    #[error("ffmpeg exited with {0}")]
    FfmpegFailed(ExitStatus),

    #[error("failed to rename {} to {}: {source}", .from.display(), .to.display())]
    Rename {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Turn a title into a file-name fragment: non-word runs become `-`, the
/// result is capped, lowercased and stripped of trailing dashes.
pub fn sanitize_title(title: &str) -> String {
    let mut slug = NON_WORD.replace_all(title, "-").into_owned();
    // Only ASCII survives the replacement, so any byte index is a char boundary.
    slug.truncate(MAX_TITLE_LEN);
    slug.make_ascii_lowercase();
    slug.trim_end_matches('-').to_string()
}

/// Name `path` would get after a title rename: `<stem>-<title>.<ext>`.
pub fn titled_path(path: &Path, title: &str) -> Option<PathBuf> {
    let slug = sanitize_title(title);
    if slug.is_empty() {
        return None;
    }

    let file_name = path.file_name()?.to_string_lossy().into_owned();
    let (stem, ext) = match file_name.split_once('.') {
        Some((stem, _)) => (stem.to_string(), path.extension().map(|e| e.to_string_lossy().into_owned())),
        None => (file_name.clone(), None),
    };

    let renamed = match ext {
        Some(ext) => format!("{}-{}.{}", stem, slug, ext),
        None => format!("{}-{}", stem, slug),
    };
    Some(path.with_file_name(renamed))
}

/// Rename a downloaded file after its video title. Returns the new path, or
/// the old one when the title yields nothing usable.
pub async fn rename_by_title(path: &Path, title: &str) -> Result<PathBuf, PostProcessError> {
    let Some(target) = titled_path(path, title) else {
        tracing::debug!("Title {:?} has no usable characters, keeping {}", title, path.display());
        return Ok(path.to_path_buf());
    };

    tokio::fs::rename(path, &target)
        .await
        .map_err(|source| PostProcessError::Rename {
            from: path.to_path_buf(),
            to: target.clone(),
            source,
        })?;
    tracing::debug!("Renamed {} -> {}", path.display(), target.display());
    Ok(target)
}

/// Search `PATH` for an ffmpeg executable.
pub fn find_ffmpeg() -> Option<PathBuf> {
    which::which("ffmpeg").ok()
}

/// Search an explicit `PATH`-style list of directories for ffmpeg.
pub fn find_ffmpeg_in(search_path: impl AsRef<OsStr>) -> Option<PathBuf> {
    which::which_in("ffmpeg", Some(search_path), ".").ok()
}

/// Extract the audio track of `path` into a sibling `.mp3` file.
pub async fn extract_audio(path: &Path) -> Result<PathBuf, PostProcessError> {
    let ffmpeg = find_ffmpeg().ok_or(PostProcessError::FfmpegMissing)?;
    extract_audio_with(&ffmpeg, path).await
}

/// Same as [`extract_audio`] with an explicit ffmpeg binary.
pub async fn extract_audio_with(ffmpeg: &Path, path: &Path) -> Result<PathBuf, PostProcessError> {
    let mp3 = path.with_extension("mp3");
    tracing::debug!("Running {} on {}", ffmpeg.display(), path.display());

    let status = tokio::process::Command::new(ffmpeg)
        .args(["-y", "-loglevel", "quiet", "-i"])
        .arg(path)
        .arg("-vn")
        .arg(&mp3)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await?;

    if !status.success() {
        return Err(PostProcessError::FfmpegFailed(status));
    }
    Ok(mp3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_title() {
        assert_eq!(sanitize_title("Big Buck Bunny (4K)!"), "big-buck-bunny-4k");
        assert_eq!(sanitize_title("Ünïcode — title"), "-n-code-title");
        assert_eq!(sanitize_title("???"), "");
    }

    #[test]
    fn test_sanitize_title_caps_length() {
        let long = "a".repeat(100);
        assert_eq!(sanitize_title(&long).len(), 64);

        // Cut lands on a dash, which is then trimmed.
        let dashed = format!("{} tail", "b".repeat(63));
        assert_eq!(sanitize_title(&dashed), "b".repeat(63));
    }

    #[test]
    fn test_titled_path() {
        let path = Path::new("/tmp/out/abc123.mp4");
        assert_eq!(
            titled_path(path, "My Video"),
            Some(PathBuf::from("/tmp/out/abc123-my-video.mp4"))
        );
        assert_eq!(titled_path(Path::new("abc"), "X"), Some(PathBuf::from("abc-x")));
        assert_eq!(titled_path(path, "!!!"), None);
    }

    #[tokio::test]
    async fn test_rename_by_title_moves_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("abc.webm");
        std::fs::write(&path, b"data").unwrap();

        let renamed = rename_by_title(&path, "Hello, World").await.unwrap();
        assert_eq!(renamed, dir.path().join("abc-hello-world.webm"));
        assert!(!path.exists());
        assert_eq!(std::fs::read(&renamed).unwrap(), b"data");
    }

    #[tokio::test]
    async fn test_rename_by_title_reports_missing_source() {
        let dir = TempDir::new().unwrap();
        let err = rename_by_title(&dir.path().join("gone.mp4"), "title").await.unwrap_err();
        assert!(matches!(err, PostProcessError::Rename { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_extract_audio_with_fake_ffmpeg() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let fake = dir.path().join("ffmpeg");
        // Last argument is the output file.
        std::fs::write(&fake, "#!/bin/sh\nfor last; do :; done\necho audio > \"$last\"\n").unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let input = dir.path().join("abc.mp4");
        std::fs::write(&input, b"video").unwrap();

        let mp3 = extract_audio_with(&fake, &input).await.unwrap();
        assert_eq!(mp3, dir.path().join("abc.mp3"));
        assert!(mp3.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_find_ffmpeg_skips_non_executable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let shadow = dir.path().join("a");
        let real = dir.path().join("b");
        std::fs::create_dir(&shadow).unwrap();
        std::fs::create_dir(&real).unwrap();

        std::fs::write(shadow.join("ffmpeg"), "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(shadow.join("ffmpeg"), std::fs::Permissions::from_mode(0o644)).unwrap();
        std::fs::write(real.join("ffmpeg"), "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(real.join("ffmpeg"), std::fs::Permissions::from_mode(0o755)).unwrap();

        let search_path = std::env::join_paths([&shadow, &real]).unwrap();
        assert_eq!(find_ffmpeg_in(&search_path), Some(real.join("ffmpeg")));
    }

    #[test]
    fn test_find_ffmpeg_missing() {
        let dir = TempDir::new().unwrap();
        assert_eq!(find_ffmpeg_in(dir.path()), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_extract_audio_reports_failure() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let fake = dir.path().join("ffmpeg");
        std::fs::write(&fake, "#!/bin/sh\nexit 3\n").unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let err = extract_audio_with(&fake, &dir.path().join("abc.mp4")).await.unwrap_err();
        assert!(matches!(err, PostProcessError::FfmpegFailed(_)));
    }
}
