//! Domain types describing a single image and its load state.

use serde::{Deserialize, Serialize};

/// Stable identifier for an image URL.
/// Derived from a hash of the URL so the same URL always maps to the same id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageId(pub String);

impl ImageId {
    /// Creates a new `ImageId` from any string-like input.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates an `ImageId` from a URL by hashing it.
    #[must_use]
    pub fn from_url(url: &str) -> Self {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        let result = hasher.finalize();
        Self(hex::encode(&result[..16]))
    }

    /// Returns the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ImageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ImageId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Load state of one distinct URL.
///
/// The original URL and its format-rewritten variant are tracked as separate entries.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct LoadState {
    /// URL this state belongs to.
    pub url: String,
    /// Image was fetched and decoded.
    pub is_loaded: bool,
    /// A load is in flight.
    pub is_loading: bool,
    /// Message of the last failure, if the last attempt failed.
    pub error: Option<String>,
}

impl LoadState {
    /// Untouched state for a URL that has never been requested.
    #[must_use]
    pub fn untouched(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// State while a load is in flight.
    #[must_use]
    pub fn loading(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            is_loading: true,
            ..Self::default()
        }
    }

    /// State after a successful load.
    #[must_use]
    pub fn loaded(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            is_loaded: true,
            ..Self::default()
        }
    }

    /// State after a failed load.
    #[must_use]
    pub fn failed(url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Returns true if nothing has happened for this URL yet.
    #[must_use]
    pub const fn is_untouched(&self) -> bool {
        !self.is_loaded && !self.is_loading && self.error.is_none()
    }

    /// Returns true if the last attempt failed.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Image encoding, as far as it can be told from a URL or content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// WebP.
    Webp,
    /// AVIF.
    Avif,
    /// JPEG.
    Jpeg,
    /// PNG.
    Png,
    /// GIF.
    Gif,
    /// SVG.
    Svg,
    /// Anything that could not be identified.
    Unknown,
}

impl ImageFormat {
    /// Guesses the format of a URL from its format query parameters or path extension.
    #[must_use]
    pub fn from_url(url: &str) -> Self {
        let (path, query) = url.split_once('?').unwrap_or((url, ""));

        for pair in query.split('&') {
            if let Some((key, value)) = pair.split_once('=')
                && matches!(key, "format" | "fm" | "output" | "f")
            {
                let format = Self::from_extension(value);
                if format != Self::Unknown {
                    return format;
                }
            }
        }

        if path.split('/').any(|segment| segment == "f_webp") {
            return Self::Webp;
        }

        path.rsplit('/')
            .next()
            .and_then(|file| file.rsplit_once('.'))
            .map_or(Self::Unknown, |(_, ext)| Self::from_extension(ext))
    }

    /// Maps a file extension or format parameter value to a format.
    #[must_use]
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "webp" => Self::Webp,
            "avif" => Self::Avif,
            "jpg" | "jpeg" | "pjpg" => Self::Jpeg,
            "png" => Self::Png,
            "gif" => Self::Gif,
            "svg" => Self::Svg,
            _ => Self::Unknown,
        }
    }

    /// Maps a MIME content type to a format.
    #[must_use]
    pub fn from_content_type(content_type: &str) -> Self {
        content_type
            .split(';')
            .next()
            .and_then(|mime| mime.trim().strip_prefix("image/"))
            .map_or(Self::Unknown, |sub| match sub {
                "svg+xml" => Self::Svg,
                other => Self::from_extension(other),
            })
    }

    /// Returns true for WebP.
    #[must_use]
    pub const fn is_webp(self) -> bool {
        matches!(self, Self::Webp)
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Webp => "webp",
            Self::Avif => "avif",
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::Svg => "svg",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Pixel dimensions of a decoded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Returns true if width equals height.
    #[must_use]
    pub const fn is_square(self) -> bool {
        self.width == self.height
    }
}
