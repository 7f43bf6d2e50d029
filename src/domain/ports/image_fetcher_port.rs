//! Port for fetching and decoding images.

use async_trait::async_trait;

use crate::domain::entities::{Dimensions, ImageFormat};
use crate::domain::errors::LoadResult;

/// A successfully fetched and decoded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    /// URL that was fetched.
    pub url: String,
    /// Detected encoding.
    pub format: ImageFormat,
    /// Decoded dimensions.
    pub dimensions: Option<Dimensions>,
    /// Encoded size in bytes.
    pub byte_len: usize,
}

/// Port for the network boundary.
/// Implementations must be thread-safe.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Fetches and decodes the image at `url`.
    ///
    /// `priority` requests the elevated scheduling path.
    async fn fetch(&self, url: &str, priority: bool) -> LoadResult<FetchedImage>;
}
