//! Media URL resolution.
//!
//! A [`MediaResolver`] turns a supported social-media link into a direct,
//! fetchable media URL. Implementations are thin wrappers over external
//! tools and services; the bot core only depends on the trait.

/// HTTP mirror-API fallback resolver.
pub mod mirror;
/// yt-dlp subprocess resolver.
pub mod ytdlp;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;
use url::Url;

/// Platforms a link can be resolved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaSource {
    /// youtube.com / youtu.be
    YouTube,
    /// instagram.com
    Instagram,
    /// tiktok.com
    TikTok,
    /// facebook.com / fb.com
    Facebook,
}

fn matches_domain(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{domain}"))
}

impl MediaSource {
    /// Classify a URL by host. Returns `None` for hosts outside the
    /// supported platforms, which callers must reject before consuming
    /// any rate-limiter state.
    #[must_use]
    pub fn classify(url: &Url) -> Option<Self> {
        let host = url.host_str()?;
        if matches_domain(host, "youtube.com") || matches_domain(host, "youtu.be") {
            Some(Self::YouTube)
        } else if matches_domain(host, "instagram.com") {
            Some(Self::Instagram)
        } else if matches_domain(host, "tiktok.com") {
            Some(Self::TikTok)
        } else if matches_domain(host, "facebook.com") || matches_domain(host, "fb.com") {
            Some(Self::Facebook)
        } else {
            None
        }
    }

    /// Human-readable platform name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::YouTube => "YouTube",
            Self::Instagram => "Instagram",
            Self::TikTok => "TikTok",
            Self::Facebook => "Facebook",
        }
    }
}

impl fmt::Display for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Successful resolution result.
#[derive(Debug, Clone)]
pub struct ResolvedMedia {
    /// Direct, fetchable media URL.
    pub media_url: Url,
    /// Media title, when the resolver could extract one.
    pub title: Option<String>,
    /// Platform the link came from.
    pub source: MediaSource,
}

/// Resolution failures, split by how the caller should react.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The URL's host is not a supported platform (or this resolver
    /// does not handle it).
    #[error("unsupported URL")]
    Unsupported,
    /// The media itself cannot be fetched (private, removed,
    /// geo-blocked). Retrying or falling back will not help.
    #[error("media unavailable: {0}")]
    Fatal(String),
    /// A transient failure (network, upstream throttling). A later
    /// retry or another resolver may succeed.
    #[error("temporary failure: {0}")]
    Transient(String),
    /// The external tool or service misbehaved (failed to spawn,
    /// unparseable output).
    #[error("resolver error: {0}")]
    Tool(String),
}

/// Turns a supported video link into a direct media URL.
///
/// Implementations may take seconds and fail transiently; callers must
/// have taken any admission decision before invoking them.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Resolver name for logging.
    fn name(&self) -> &'static str;

    /// Resolve `url` to a direct media URL or fail with a descriptive
    /// error.
    async fn resolve(&self, url: &Url) -> Result<ResolvedMedia, ResolveError>;
}

/// Tries resolvers in order, falling through on transient and tool
/// failures. Fatal errors stop the chain: if one resolver has
/// determined the media is gone, another will not bring it back.
pub struct ChainResolver {
    resolvers: Vec<Arc<dyn MediaResolver>>,
}

impl ChainResolver {
    /// Build a chain from an ordered list of resolvers.
    #[must_use]
    pub fn new(resolvers: Vec<Arc<dyn MediaResolver>>) -> Self {
        Self { resolvers }
    }
}

#[async_trait]
impl MediaResolver for ChainResolver {
    fn name(&self) -> &'static str {
        "chain"
    }

    async fn resolve(&self, url: &Url) -> Result<ResolvedMedia, ResolveError> {
        let mut last: Option<ResolveError> = None;
        for resolver in &self.resolvers {
            match resolver.resolve(url).await {
                Ok(media) => return Ok(media),
                Err(e @ ResolveError::Fatal(_)) => return Err(e),
                Err(ResolveError::Unsupported) => {
                    // This resolver does not handle the host; the next
                    // one might.
                }
                Err(e) => {
                    warn!(resolver = resolver.name(), error = %e, "Resolver failed, trying next");
                    last = Some(e);
                }
            }
        }
        Err(last.unwrap_or(ResolveError::Unsupported))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).expect("test URL must parse")
    }

    #[test]
    fn test_classify_supported_hosts() {
        assert_eq!(
            MediaSource::classify(&url("https://www.youtube.com/watch?v=abc")),
            Some(MediaSource::YouTube)
        );
        assert_eq!(
            MediaSource::classify(&url("https://youtu.be/abc")),
            Some(MediaSource::YouTube)
        );
        assert_eq!(
            MediaSource::classify(&url("https://m.youtube.com/watch?v=abc")),
            Some(MediaSource::YouTube)
        );
        assert_eq!(
            MediaSource::classify(&url("https://www.instagram.com/reel/XyZ/")),
            Some(MediaSource::Instagram)
        );
        assert_eq!(
            MediaSource::classify(&url("https://www.tiktok.com/@u/video/1")),
            Some(MediaSource::TikTok)
        );
        assert_eq!(
            MediaSource::classify(&url("https://fb.com/watch?v=1")),
            Some(MediaSource::Facebook)
        );
    }

    #[test]
    fn test_classify_rejects_unknown_hosts() {
        assert_eq!(MediaSource::classify(&url("https://example.com/video")), None);
        // Suffix tricks must not match: not-youtube.com is not youtube.com.
        assert_eq!(
            MediaSource::classify(&url("https://notyoutube.com/watch")),
            None
        );
        assert_eq!(
            MediaSource::classify(&url("https://youtube.com.evil.example/x")),
            None
        );
    }

    struct StaticResolver {
        name: &'static str,
        result: fn() -> Result<ResolvedMedia, ResolveError>,
    }

    #[async_trait]
    impl MediaResolver for StaticResolver {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn resolve(&self, _url: &Url) -> Result<ResolvedMedia, ResolveError> {
            (self.result)()
        }
    }

    fn ok_media() -> Result<ResolvedMedia, ResolveError> {
        Ok(ResolvedMedia {
            media_url: Url::parse("https://cdn.example.com/v.mp4").expect("static URL"),
            title: None,
            source: MediaSource::YouTube,
        })
    }

    #[tokio::test]
    async fn test_chain_falls_through_on_transient() {
        let chain = ChainResolver::new(vec![
            Arc::new(StaticResolver {
                name: "a",
                result: || Err(ResolveError::Transient("down".into())),
            }),
            Arc::new(StaticResolver {
                name: "b",
                result: ok_media,
            }),
        ]);

        let media = chain
            .resolve(&url("https://youtu.be/abc"))
            .await
            .expect("second resolver should win");
        assert_eq!(media.source, MediaSource::YouTube);
    }

    #[tokio::test]
    async fn test_chain_stops_on_fatal() {
        let chain = ChainResolver::new(vec![
            Arc::new(StaticResolver {
                name: "a",
                result: || Err(ResolveError::Fatal("private video".into())),
            }),
            Arc::new(StaticResolver {
                name: "b",
                result: ok_media,
            }),
        ]);

        let err = chain
            .resolve(&url("https://youtu.be/abc"))
            .await
            .expect_err("fatal error must short-circuit");
        assert!(matches!(err, ResolveError::Fatal(_)));
    }

    #[tokio::test]
    async fn test_chain_skips_unsupported_and_keeps_real_error() {
        let chain = ChainResolver::new(vec![
            Arc::new(StaticResolver {
                name: "a",
                result: || Err(ResolveError::Transient("down".into())),
            }),
            Arc::new(StaticResolver {
                name: "b",
                result: || Err(ResolveError::Unsupported),
            }),
        ]);

        let err = chain
            .resolve(&url("https://youtu.be/abc"))
            .await
            .expect_err("all resolvers failed");
        // The transient failure is the informative one, not Unsupported.
        assert!(matches!(err, ResolveError::Transient(_)));
    }
}
