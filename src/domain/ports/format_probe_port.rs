//! Port for runtime image-format capability checks.

use async_trait::async_trait;

use crate::domain::entities::ImageFormat;

/// Decodes a tiny known-good sample to learn whether the runtime supports a format.
#[async_trait]
pub trait FormatProbe: Send + Sync {
    /// Returns true if a sample of `format` decodes.
    async fn can_decode(&self, format: ImageFormat) -> bool;
}
