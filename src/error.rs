// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Terminal error reports for tubegrab.
//!
//! Turns library errors into a title, a list of likely causes and a list of
//! things to try, so a failed download always tells the user how to continue.

use std::fmt;

use crate::download::DownloadError;
use crate::postprocess::PostProcessError;
use crate::video::MetadataError;

/// Footer printed under every report.
pub const HELP_FOOTER: &str = "Need help? Re-run with --verbose for debug logs.";

/// Formats an error message with title, causes and fixes.
///
/// # Example
///
/// ```
/// use tubegrab::error::format_error;
///
/// let error = format_error(
///     "Download failed",
///     &["Server dropped the connection"],
///     &["Resume: tubegrab get VIDEO --resume"],
/// );
/// println!("{}", error);
/// ```
pub fn format_error(title: &str, causes: &[&str], fixes: &[&str]) -> String {
    let mut output = format!("[✗] {}\n\n", title);

    if !causes.is_empty() {
        output.push_str("Possible causes:\n");
        for cause in causes {
            output.push_str(&format!("  - {}\n", cause));
        }
        output.push('\n');
    }

    if !fixes.is_empty() {
        output.push_str("Try these fixes:\n");
        for (i, fix) in fixes.iter().enumerate() {
            output.push_str(&format!("  {}. {}\n", i + 1, fix));
        }
        output.push('\n');
    }

    output.push_str(HELP_FOOTER);
    output
}

/// Builder for constructing formatted error messages.
///
/// # Example
///
/// ```
/// use tubegrab::error::ErrorBuilder;
///
/// let error = ErrorBuilder::new("Video unavailable")
///     .cause("The video is private")
///     .fix("Check the URL in a browser")
///     .build();
/// println!("{}", error);
/// ```
#[derive(Debug, Clone)]
pub struct ErrorBuilder {
    title: String,
    causes: Vec<String>,
    fixes: Vec<String>,
}

impl ErrorBuilder {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            causes: Vec::new(),
            fixes: Vec::new(),
        }
    }

    pub fn cause(mut self, cause: impl Into<String>) -> Self {
        self.causes.push(cause.into());
        self
    }

    pub fn fix(mut self, fix: impl Into<String>) -> Self {
        self.fixes.push(fix.into());
        self
    }

    pub fn build(self) -> String {
        let causes: Vec<&str> = self.causes.iter().map(|s| s.as_str()).collect();
        let fixes: Vec<&str> = self.fixes.iter().map(|s| s.as_str()).collect();
        format_error(&self.title, &causes, &fixes)
    }
}

impl fmt::Display for ErrorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.clone().build())
    }
}

/// Report for a failed transfer. `resume_hint` is the command that continues it.
pub fn download_report(err: &DownloadError, resume_hint: &str) -> ErrorBuilder {
    let builder = ErrorBuilder::new(format!("Download failed: {}", err));
    match err {
        DownloadError::Probe(_) => builder
            .cause("The stream URL expired or was rejected")
            .cause("The server did not report a Content-Length")
            .fix("Fetch fresh metadata and try again"),
        DownloadError::ChunkTransfer { status, .. } if status.as_u16() == 403 => builder
            .cause("The stream URL expired mid-download")
            .fix(format!("Continue with fresh metadata: {}", resume_hint)),
        DownloadError::ChunkTransfer { .. } => builder
            .cause("The server kept refusing the same byte range")
            .fix(format!("Continue later: {}", resume_hint))
            .fix("Raise the attempt ceiling with --retries"),
        DownloadError::Connection(_) => builder
            .cause("Network connection dropped")
            .cause("DNS or proxy problems")
            .fix(format!("Check your connection, then: {}", resume_hint)),
        DownloadError::FileIo { path, .. } => builder
            .cause(format!("Cannot write to {}", path.display()))
            .cause("Disk full or permission denied")
            .fix("Pick another output directory with -o"),
    }
}

/// Report for a metadata failure.
pub fn metadata_report(err: &MetadataError) -> ErrorBuilder {
    let builder = ErrorBuilder::new(err.to_string());
    match err {
        MetadataError::InvalidId(_) => builder
            .cause("The argument is neither a video id nor a watch URL")
            .fix("Pass the id directly: tubegrab get dQw4w9WgXcQ"),
        MetadataError::Request(_) => builder
            .cause("The metadata endpoint could not be reached")
            .fix("Check your network connection"),
        MetadataError::Unavailable(_) => builder
            .cause("The video is private, removed or region locked")
            .fix("Open the video in a browser to confirm it plays"),
        MetadataError::Malformed(_) => builder
            .cause("The metadata format changed")
            .fix("Re-run with --verbose and report the output"),
    }
}

/// Short notice for a post-processing failure. These never fail the command.
pub fn postprocess_notice(err: &PostProcessError) -> String {
    match err {
        PostProcessError::FfmpegMissing => "ffmpeg not found; install it to extract audio".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::ByteRange;
    use reqwest::StatusCode;

    #[test]
    fn test_format_error() {
        let error = format_error("Test Error", &["Cause 1", "Cause 2"], &["Fix 1", "Fix 2"]);

        assert!(error.contains("[✗] Test Error"));
        assert!(error.contains("Possible causes:"));
        assert!(error.contains("  - Cause 2"));
        assert!(error.contains("Try these fixes:"));
        assert!(error.contains("  2. Fix 2"));
        assert!(error.ends_with(HELP_FOOTER));
    }

    #[test]
    fn test_empty_causes_and_fixes() {
        let error = format_error("Empty test", &[], &[]);
        assert!(!error.contains("Possible causes:"));
        assert!(!error.contains("Try these fixes:"));
    }

    #[test]
    fn test_error_builder_display() {
        let builder = ErrorBuilder::new("Display test").cause("Cause").fix("Fix");
        assert_eq!(format!("{}", builder), builder.build());
    }

    #[test]
    fn test_download_report_mentions_resume() {
        let err = DownloadError::ChunkTransfer {
            range: ByteRange::bounded(0, 10),
            attempts: 10,
            status: StatusCode::SERVICE_UNAVAILABLE,
        };
        let text = download_report(&err, "tubegrab get abc --resume").build();
        assert!(text.contains("503"));
        assert!(text.contains("tubegrab get abc --resume"));
    }

    #[test]
    fn test_metadata_report() {
        let text = metadata_report(&MetadataError::Unavailable("private".into())).build();
        assert!(text.contains("video unavailable: private"));
        assert!(text.contains("browser"));
    }

    #[test]
    fn test_postprocess_notice() {
        assert!(postprocess_notice(&PostProcessError::FfmpegMissing).contains("install"));
    }
}
