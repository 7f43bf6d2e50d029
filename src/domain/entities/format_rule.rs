//! Host-pattern table describing how remote image URLs request WebP.

use serde::{Deserialize, Serialize};

/// How a matching URL is rewritten to request WebP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RewriteAction {
    /// Sets `name=value` in the query string, replacing any existing `name`.
    QueryParam {
        /// Parameter name.
        name: String,
        /// Parameter value.
        value: String,
    },
    /// Inserts a path segment right after `marker`, e.g. `/upload/` + `f_webp`.
    PathSegment {
        /// Path fragment after which the segment goes.
        marker: String,
        /// Segment to insert.
        segment: String,
    },
}

impl RewriteAction {
    /// Applies the action to `url`.
    #[must_use]
    pub fn apply(&self, url: &str) -> String {
        match self {
            Self::QueryParam { name, value } => set_query_param(url, name, value),
            Self::PathSegment { marker, segment } => insert_path_segment(url, marker, segment),
        }
    }
}

/// One entry of the host table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRule {
    /// Regular expression matched against the URL's host.
    pub host: String,
    /// Rewrite applied on match.
    #[serde(flatten)]
    pub action: RewriteAction,
}

impl HostRule {
    /// Rule setting a query parameter.
    #[must_use]
    pub fn query(host: &str, name: &str, value: &str) -> Self {
        Self {
            host: host.to_string(),
            action: RewriteAction::QueryParam {
                name: name.to_string(),
                value: value.to_string(),
            },
        }
    }

    /// Rule inserting a path segment.
    #[must_use]
    pub fn path(host: &str, marker: &str, segment: &str) -> Self {
        Self {
            host: host.to_string(),
            action: RewriteAction::PathSegment {
                marker: marker.to_string(),
                segment: segment.to_string(),
            },
        }
    }

    /// Table used when configuration does not provide one.
    #[must_use]
    pub fn default_table() -> Vec<Self> {
        vec![
            Self::query(r"^images\.unsplash\.com$", "fm", "webp"),
            Self::query(r"^images\.pexels\.com$", "fm", "webp"),
            Self::query(r"\.imgix\.net$", "fm", "webp"),
            Self::query(r"^cdn\.shopify\.com$", "format", "webp"),
            Self::query(r"^images\.ctfassets\.net$", "fm", "webp"),
            Self::path(r"^res\.cloudinary\.com$", "/upload/", "f_webp"),
        ]
    }
}

fn set_query_param(url: &str, name: &str, value: &str) -> String {
    let (url, fragment) = split_fragment(url);
    let (base_url, existing_params) = if let Some(idx) = url.find('?') {
        (&url[..idx], Some(&url[idx + 1..]))
    } else {
        (url, None)
    };

    let mut params: Vec<String> = existing_params
        .into_iter()
        .flat_map(|existing| existing.split('&'))
        .filter(|param| {
            let key = param.split('=').next().unwrap_or("");
            !param.is_empty() && key != name
        })
        .map(String::from)
        .collect();
    params.push(format!("{name}={value}"));

    format!("{}?{}{}", base_url, params.join("&"), fragment)
}

fn insert_path_segment(url: &str, marker: &str, segment: &str) -> String {
    let (url, fragment) = split_fragment(url);
    let Some(idx) = url.find(marker) else {
        return format!("{url}{fragment}");
    };
    let split_at = idx + marker.len();
    let (head, tail) = url.split_at(split_at);

    let next = tail.split(['/', '?']).next().unwrap_or("");
    if next.split(',').any(|part| part == segment) {
        return format!("{url}{fragment}");
    }

    format!("{head}{segment}/{tail}{fragment}")
}

fn split_fragment(url: &str) -> (&str, &str) {
    url.find('#').map_or((url, ""), |idx| url.split_at(idx))
}
