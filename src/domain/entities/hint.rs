//! Early network hints placed ahead of image requests.

use serde::Serialize;
use url::Url;

use super::image::ImageId;

/// Kind of network hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HintKind {
    /// Fetch the image early.
    Preload,
    /// Open a connection to the image's origin early.
    Preconnect,
}

impl HintKind {
    /// The `rel` attribute value.
    #[must_use]
    pub const fn rel(self) -> &'static str {
        match self {
            Self::Preload => "preload",
            Self::Preconnect => "preconnect",
        }
    }
}

/// A live hint for one URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreloadHint {
    /// Hinted URL (an origin for preconnect hints).
    pub url: String,
    /// Deterministic id derived from kind and URL.
    pub hint_id: ImageId,
    /// Hint kind.
    pub kind: HintKind,
    /// Requests elevated fetch priority.
    pub high_priority: bool,
}

impl PreloadHint {
    /// Creates a preload hint.
    #[must_use]
    pub fn preload(url: impl Into<String>, high_priority: bool) -> Self {
        let url = url.into();
        Self {
            hint_id: Self::id_for(HintKind::Preload, &url),
            url,
            kind: HintKind::Preload,
            high_priority,
        }
    }

    /// Creates a preconnect hint for an origin.
    #[must_use]
    pub fn preconnect(origin: impl Into<String>) -> Self {
        let url = origin.into();
        Self {
            hint_id: Self::id_for(HintKind::Preconnect, &url),
            url,
            kind: HintKind::Preconnect,
            high_priority: false,
        }
    }

    /// Id a hint of `kind` for `url` would get.
    #[must_use]
    pub fn id_for(kind: HintKind, url: &str) -> ImageId {
        match kind {
            HintKind::Preload => ImageId::from_url(url),
            HintKind::Preconnect => ImageId::from_url(&format!("preconnect:{url}")),
        }
    }

    /// Renders the `<link>` element a document head would carry for this hint.
    #[must_use]
    pub fn to_markup(&self) -> String {
        match self.kind {
            HintKind::Preload => {
                let priority = if self.high_priority {
                    " fetchpriority=\"high\""
                } else {
                    ""
                };
                format!(
                    "<link rel=\"preload\" as=\"image\" href=\"{}\" id=\"hint-{}\"{priority}>",
                    escape_attr(&self.url),
                    self.hint_id
                )
            }
            HintKind::Preconnect => format!(
                "<link rel=\"preconnect\" href=\"{}\" id=\"hint-{}\" crossorigin>",
                escape_attr(&self.url),
                self.hint_id
            ),
        }
    }
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Origin (`scheme://host[:port]`) of an absolute URL, without credentials or default port.
#[must_use]
pub fn origin_of(url: &str) -> Option<String> {
    let origin = Url::parse(url).ok()?.origin();
    origin.is_tuple().then(|| origin.ascii_serialization())
}
