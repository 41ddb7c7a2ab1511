//! Resolves media links by invoking the `yt-dlp` command-line tool.
//!
//! `yt-dlp` is asked for single-file metadata only (`--skip-download`),
//! and the direct URL of the selected format is taken from its JSON
//! output. Stderr is classified into fatal and transient failures so the
//! caller can decide between giving up and falling back.

use crate::resolver::{MediaResolver, MediaSource, ResolveError, ResolvedMedia};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};
use url::Url;

/// Patterns in yt-dlp stderr indicating the media cannot be fetched at
/// all; no retry or fallback will help.
const FATAL_ERROR_PATTERNS: &[&str] = &[
    "Video unavailable",
    "Private video",
    "This video is not available",
    "This video is private",
    "removed by the uploader",
    "no longer available",
    "blocked it in your country",
    "geo-restricted",
    "Sign in to confirm your age",
    "age-restricted",
    "members-only",
    "terminated account",
    "This video has been removed",
    "ERROR: Unsupported URL",
    "is not a valid URL",
    "Unable to extract video data",
    "HTTP Error 403",
    "HTTP Error 404",
];

/// Patterns indicating a transient failure that a retry or another
/// resolver might get past.
const TRANSIENT_ERROR_PATTERNS: &[&str] = &[
    "Connection reset",
    "Connection timed out",
    "Unable to download webpage",
    "HTTP Error 429",
    "HTTP Error 503",
    "Read timed out",
    "network is unreachable",
    "Temporary failure in name resolution",
];

fn is_fatal_error(stderr: &str) -> bool {
    FATAL_ERROR_PATTERNS.iter().any(|p| stderr.contains(p))
}

fn is_transient_error(stderr: &str) -> bool {
    TRANSIENT_ERROR_PATTERNS.iter().any(|p| stderr.contains(p))
}

/// Map a failed yt-dlp run to a [`ResolveError`].
fn classify_failure(stderr: &str) -> ResolveError {
    let msg = stderr.trim().to_string();
    if is_fatal_error(&msg) {
        ResolveError::Fatal(msg)
    } else if is_transient_error(&msg) {
        ResolveError::Transient(msg)
    } else {
        ResolveError::Tool(msg)
    }
}

/// Pull the direct URL and title out of yt-dlp's single-video JSON dump.
fn extract_media(stdout: &str, source: MediaSource) -> Result<ResolvedMedia, ResolveError> {
    let info: serde_json::Value = serde_json::from_str(stdout.trim())
        .map_err(|e| ResolveError::Tool(format!("unparseable yt-dlp output: {e}")))?;

    let direct = info["url"]
        .as_str()
        .ok_or_else(|| ResolveError::Tool("no direct URL in yt-dlp output".to_string()))?;
    let media_url = Url::parse(direct)
        .map_err(|e| ResolveError::Tool(format!("yt-dlp returned an invalid URL: {e}")))?;

    Ok(ResolvedMedia {
        media_url,
        title: info["title"].as_str().map(str::to_string),
        source,
    })
}

/// Resolver backed by a local `yt-dlp` binary.
pub struct YtDlpResolver {
    binary: String,
}

impl YtDlpResolver {
    /// Use the `yt-dlp` found on `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            binary: "yt-dlp".to_string(),
        }
    }

    /// Use a specific binary path or name.
    #[must_use]
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for YtDlpResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn resolve(&self, url: &Url) -> Result<ResolvedMedia, ResolveError> {
        let source = MediaSource::classify(url).ok_or(ResolveError::Unsupported)?;

        debug!(%url, %source, "Invoking yt-dlp");
        // Arguments are passed as an argv vector, never through a shell,
        // so the URL needs no quoting.
        let output = Command::new(&self.binary)
            .args([
                "--no-playlist",
                "--no-warnings",
                "--skip-download",
                "-f",
                "mp4/best",
                "--dump-single-json",
            ])
            .arg(url.as_str())
            .output()
            .await
            .map_err(|e| ResolveError::Tool(format!("failed to run {}: {e}", self.binary)))?;

        if output.status.success() {
            extract_media(&String::from_utf8_lossy(&output.stdout), source)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(%url, stderr = %stderr.trim(), "yt-dlp failed");
            Err(classify_failure(&stderr))
        }
    }
}

/// Report the version of the `yt-dlp` binary on `PATH`, if any.
///
/// Used at startup and by the `/version` command to surface a missing
/// or broken installation early.
pub async fn probe_version() -> Option<String> {
    let output = Command::new("yt-dlp").arg("--version").output().await.ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_errors_detected() {
        assert!(is_fatal_error("ERROR: Private video"));
        assert!(is_fatal_error("ERROR: Video unavailable"));
        assert!(is_fatal_error(
            "ERROR: The uploader has blocked it in your country"
        ));
        assert!(!is_fatal_error("ERROR: Connection reset by peer"));
    }

    #[test]
    fn test_transient_errors_detected() {
        assert!(is_transient_error("ERROR: Connection reset by peer"));
        assert!(is_transient_error("ERROR: HTTP Error 429: Too Many Requests"));
        assert!(!is_transient_error("ERROR: Private video"));
    }

    #[test]
    fn test_classify_failure_precedence() {
        assert!(matches!(
            classify_failure("ERROR: Private video"),
            ResolveError::Fatal(_)
        ));
        assert!(matches!(
            classify_failure("ERROR: Read timed out"),
            ResolveError::Transient(_)
        ));
        assert!(matches!(
            classify_failure("something else went wrong"),
            ResolveError::Tool(_)
        ));
    }

    #[test]
    fn test_extract_media_from_json_dump() {
        let stdout = r#"{"title": "A clip", "url": "https://cdn.example.com/v.mp4", "ext": "mp4"}"#;
        let media =
            extract_media(stdout, MediaSource::YouTube).expect("valid dump must extract");
        assert_eq!(media.media_url.as_str(), "https://cdn.example.com/v.mp4");
        assert_eq!(media.title.as_deref(), Some("A clip"));
    }

    #[test]
    fn test_extract_media_requires_direct_url() {
        let stdout = r#"{"title": "A clip", "ext": "mp4"}"#;
        assert!(matches!(
            extract_media(stdout, MediaSource::YouTube),
            Err(ResolveError::Tool(_))
        ));
    }

    #[test]
    fn test_extract_media_rejects_garbage() {
        assert!(matches!(
            extract_media("not json at all", MediaSource::YouTube),
            Err(ResolveError::Tool(_))
        ));
    }
}
