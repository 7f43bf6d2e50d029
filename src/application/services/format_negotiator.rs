//! WebP capability detection and URL rewriting.

use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, trace, warn};
use url::{Origin, Url};

use crate::domain::entities::{HostRule, ImageFormat, RewriteAction};
use crate::domain::errors::{LoadError, LoadResult};
use crate::domain::ports::FormatProbe;

/// Configuration for URL rewriting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatConfig {
    /// Origin of the storefront itself; its assets are never rewritten.
    #[serde(default)]
    pub site_origin: Option<String>,

    /// Remote hosts that can serve WebP, and how to ask for it.
    #[serde(default = "HostRule::default_table")]
    pub host_rules: Vec<HostRule>,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            site_origin: None,
            host_rules: HostRule::default_table(),
        }
    }
}

struct CompiledRule {
    host: Regex,
    action: RewriteAction,
}

/// Decides whether and how an image URL is served as WebP.
///
/// The capability probe runs at most once per negotiator; its answer is kept for the
/// negotiator's lifetime.
pub struct FormatNegotiator {
    probe: Arc<dyn FormatProbe>,
    support: OnceCell<bool>,
    rules: Vec<CompiledRule>,
    site_origin: Option<Origin>,
}

impl std::fmt::Debug for FormatNegotiator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatNegotiator")
            .field("support", &self.support.get())
            .field("rules", &self.rules.len())
            .field("site_origin", &self.site_origin)
            .finish_non_exhaustive()
    }
}

impl FormatNegotiator {
    /// Creates a negotiator. Rules with invalid host patterns are skipped.
    #[must_use]
    pub fn new(probe: Arc<dyn FormatProbe>, config: &FormatConfig) -> Self {
        let rules = config
            .host_rules
            .iter()
            .filter_map(|rule| match Regex::new(&rule.host) {
                Ok(host) => Some(CompiledRule {
                    host,
                    action: rule.action.clone(),
                }),
                Err(e) => {
                    warn!(pattern = %rule.host, error = %e, "Skipping invalid host rule");
                    None
                }
            })
            .collect();

        Self {
            probe,
            support: OnceCell::new(),
            rules,
            site_origin: config.site_origin.as_deref().and_then(parse_site_origin),
        }
    }

    /// Whether the runtime decodes WebP. Probed once, then memoized.
    pub async fn supports_format(&self) -> bool {
        *self
            .support
            .get_or_init(|| async {
                let supported = self.probe.can_decode(ImageFormat::Webp).await;
                debug!(supported = supported, "WebP capability probed");
                supported
            })
            .await
    }

    /// Probe answer if it has already been computed.
    #[must_use]
    pub fn cached_support(&self) -> Option<bool> {
        self.support.get().copied()
    }

    /// Fails with `UnsupportedFormat` when WebP cannot be decoded.
    ///
    /// # Errors
    /// Returns `LoadError::UnsupportedFormat` if the probe was negative.
    pub async fn ensure_supported(&self) -> LoadResult<()> {
        if self.supports_format().await {
            Ok(())
        } else {
            Err(LoadError::unsupported_format(ImageFormat::Webp.to_string()))
        }
    }

    /// Rewrites `url` to request WebP where that is known to be safe.
    ///
    /// Returns the URL unchanged if it already targets WebP, if it is a same-origin
    /// static asset, or if no host rule matches. Applying it twice gives the same result.
    #[must_use]
    pub fn rewrite(&self, url: &str) -> String {
        if ImageFormat::from_url(url).is_webp() {
            return url.to_string();
        }

        // Relative paths do not parse and stay on the site.
        let Some(parsed) = parse_absolute(url) else {
            return url.to_string();
        };
        if self.is_same_origin_asset(&parsed) {
            return url.to_string();
        }

        // Already lowercased by the parser.
        let Some(host) = parsed.host_str() else {
            return url.to_string();
        };

        self.rules
            .iter()
            .find(|rule| rule.host.is_match(host))
            .map_or_else(|| url.to_string(), |rule| rule.action.apply(url))
    }

    /// URL to request for `url`: rewritten if WebP is supported, otherwise unchanged.
    pub async fn negotiated_url(&self, url: &str) -> String {
        match self.ensure_supported().await {
            Ok(()) => self.rewrite(url),
            Err(e) => {
                trace!(url = %url, reason = %e, "Skipping format rewrite");
                url.to_string()
            }
        }
    }

    /// Whether a failed load of `requested` should be retried with `original`.
    ///
    /// Only a rewritten URL, after a positive probe, qualifies.
    #[must_use]
    pub fn should_fall_back(&self, requested: &str, original: &str) -> bool {
        requested != original && self.cached_support() == Some(true)
    }

    /// Inline data and URLs on the site's own origin. Their WebP variants may not exist.
    fn is_same_origin_asset(&self, url: &Url) -> bool {
        matches!(url.scheme(), "data" | "blob")
            || self
                .site_origin
                .as_ref()
                .is_some_and(|origin| *origin == url.origin())
    }
}

/// Parses an absolute or protocol-relative URL.
fn parse_absolute(url: &str) -> Option<Url> {
    match url.strip_prefix("//") {
        Some(rest) => Url::parse(&format!("https://{rest}")).ok(),
        None => Url::parse(url).ok(),
    }
}

fn parse_site_origin(origin: &str) -> Option<Origin> {
    match Url::parse(origin) {
        Ok(url) if url.origin().is_tuple() => Some(url.origin()),
        Ok(_) => {
            warn!(origin = %origin, "Site origin has no host, ignoring");
            None
        }
        Err(e) => {
            warn!(origin = %origin, error = %e, "Invalid site origin, ignoring");
            None
        }
    }
}
