//! HTTP mirror-API fallback for Instagram links.
//!
//! Some Instagram media that yt-dlp cannot extract without credentials
//! is reachable through third-party mirror APIs. This resolver queries a
//! configured endpoint and expects a JSON body carrying the direct media
//! URL. It only handles Instagram; the chain skips it for other hosts.

use crate::resolver::{MediaResolver, MediaSource, ResolveError, ResolvedMedia};
use async_trait::async_trait;
use lazy_regex::lazy_regex;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Reel/post shortcode in an Instagram URL path.
static RE_SHORTCODE: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"/(?:reel|reels|p)/([A-Za-z0-9_-]+)");

/// Request timeout for the mirror endpoint.
const MIRROR_TIMEOUT_SECS: u64 = 30;

/// Pull the media URL and optional title out of a mirror-API response.
///
/// Accepts either `media_url` or `url` as the link field; mirror
/// services are not consistent about naming.
fn media_from_response(
    body: &serde_json::Value,
    source: MediaSource,
) -> Result<ResolvedMedia, ResolveError> {
    let direct = body["media_url"]
        .as_str()
        .or_else(|| body["url"].as_str())
        .ok_or_else(|| ResolveError::Tool("mirror API response carries no media URL".to_string()))?;
    let media_url = Url::parse(direct)
        .map_err(|e| ResolveError::Tool(format!("mirror API returned an invalid URL: {e}")))?;

    Ok(ResolvedMedia {
        media_url,
        title: body["title"].as_str().map(str::to_string),
        source,
    })
}

/// Extract the shortcode from an Instagram URL, when present.
fn shortcode_of(url: &Url) -> Option<&str> {
    RE_SHORTCODE
        .captures(url.path())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Resolver that queries an HTTP mirror API for Instagram media.
pub struct MirrorApiResolver {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl MirrorApiResolver {
    /// Create a resolver against `endpoint`, optionally authenticating
    /// with `api_key` via the `x-api-key` header.
    #[must_use]
    pub fn new(endpoint: String, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(MIRROR_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint,
            api_key,
        }
    }
}

#[async_trait]
impl MediaResolver for MirrorApiResolver {
    fn name(&self) -> &'static str {
        "mirror-api"
    }

    async fn resolve(&self, url: &Url) -> Result<ResolvedMedia, ResolveError> {
        let source = MediaSource::classify(url).ok_or(ResolveError::Unsupported)?;
        if source != MediaSource::Instagram {
            return Err(ResolveError::Unsupported);
        }

        if let Some(code) = shortcode_of(url) {
            debug!(shortcode = code, "Querying mirror API");
        }

        let mut request = self
            .client
            .get(&self.endpoint)
            .query(&[("url", url.as_str())]);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ResolveError::Transient(format!("mirror API request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResolveError::Transient(format!(
                "mirror API answered {status}"
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ResolveError::Tool(format!("mirror API sent unparseable JSON: {e}")))?;

        media_from_response(&body, source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn url(s: &str) -> Url {
        Url::parse(s).expect("test URL must parse")
    }

    #[test]
    fn test_shortcode_extraction() {
        assert_eq!(
            shortcode_of(&url("https://www.instagram.com/reel/Cx1_ab-9/")),
            Some("Cx1_ab-9")
        );
        assert_eq!(
            shortcode_of(&url("https://instagram.com/p/AbC123/")),
            Some("AbC123")
        );
        assert_eq!(
            shortcode_of(&url("https://www.instagram.com/someuser/")),
            None
        );
    }

    #[test]
    fn test_response_parsing_media_url_field() {
        let body = json!({"media_url": "https://cdn.example.com/reel.mp4", "title": "Reel"});
        let media = media_from_response(&body, MediaSource::Instagram)
            .expect("well-formed response must parse");
        assert_eq!(media.media_url.as_str(), "https://cdn.example.com/reel.mp4");
        assert_eq!(media.title.as_deref(), Some("Reel"));
    }

    #[test]
    fn test_response_parsing_url_fallback_field() {
        let body = json!({"url": "https://cdn.example.com/reel.mp4"});
        let media = media_from_response(&body, MediaSource::Instagram)
            .expect("alternate field name must be accepted");
        assert_eq!(media.media_url.as_str(), "https://cdn.example.com/reel.mp4");
        assert_eq!(media.title, None);
    }

    #[test]
    fn test_response_without_link_is_an_error() {
        let body = json!({"status": "ok"});
        assert!(matches!(
            media_from_response(&body, MediaSource::Instagram),
            Err(ResolveError::Tool(_))
        ));
    }

    #[tokio::test]
    async fn test_non_instagram_links_are_not_handled() {
        let resolver = MirrorApiResolver::new("https://mirror.example/api".to_string(), None);
        let err = resolver
            .resolve(&url("https://youtu.be/abc"))
            .await
            .expect_err("only Instagram is handled");
        assert!(matches!(err, ResolveError::Unsupported));
    }
}
