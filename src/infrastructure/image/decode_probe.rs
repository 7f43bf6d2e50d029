//! Format capability probe that decodes embedded samples.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::{debug, warn};

use crate::domain::entities::ImageFormat;
use crate::domain::ports::FormatProbe;

/// 1x1 WebP images, lossy then lossless.
const WEBP_SAMPLES: &[&str] = &[
    "UklGRiIAAABXRUJQVlA4IBYAAAAwAQCdASoBAAEADsD+JaQAA3AAAAAA",
    "UklGRhoAAABXRUJQVlA4TA0AAAAvAAAAEAcQERGIiP4HAA==",
];

/// 1x1 transparent PNG.
const PNG_SAMPLES: &[&str] = &[
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==",
];

/// Decodes a tiny known-good sample with the built-in codecs.
#[derive(Debug, Default, Clone, Copy)]
pub struct DecodeProbe;

impl DecodeProbe {
    /// Creates the probe.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn samples(format: ImageFormat) -> &'static [&'static str] {
        match format {
            ImageFormat::Webp => WEBP_SAMPLES,
            ImageFormat::Png => PNG_SAMPLES,
            _ => &[],
        }
    }
}

#[async_trait]
impl FormatProbe for DecodeProbe {
    async fn can_decode(&self, format: ImageFormat) -> bool {
        let samples = Self::samples(format);
        if samples.is_empty() {
            debug!(format = %format, "No probe sample for format");
            return false;
        }

        let mut decoded_samples = Vec::with_capacity(samples.len());
        for sample in samples {
            match STANDARD.decode(sample) {
                Ok(bytes) => decoded_samples.push(bytes),
                Err(e) => warn!(format = %format, error = %e, "Probe sample is not valid base64"),
            }
        }

        let decoded = tokio::task::spawn_blocking(move || {
            decoded_samples.iter().any(|bytes| {
                image::load_from_memory(bytes).is_ok_and(|img| img.width() == 1 && img.height() == 1)
            })
        })
        .await
        .unwrap_or(false);

        debug!(format = %format, supported = decoded, "Format probe finished");
        decoded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(ImageFormat::Webp, true ; "webp")]
    #[test_case(ImageFormat::Png, true ; "png")]
    #[test_case(ImageFormat::Avif, false ; "avif")]
    #[test_case(ImageFormat::Svg, false ; "svg")]
    #[tokio::test]
    async fn test_can_decode(format: ImageFormat, expected: bool) {
        assert_eq!(DecodeProbe::new().can_decode(format).await, expected);
    }
}
