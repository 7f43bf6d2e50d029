//! Ports for network conditions and image dimension lookups.

use async_trait::async_trait;

use crate::domain::entities::{ConnectionSnapshot, Dimensions};

/// Reports current network conditions.
pub trait ConnectionProbe: Send + Sync {
    /// Snapshot of the effective connection.
    fn snapshot(&self) -> ConnectionSnapshot;
}

/// Side-channel lookup of an image's decoded size.
#[async_trait]
pub trait DimensionProbe: Send + Sync {
    /// Dimensions of the image at `url`, or `None` if they cannot be determined.
    async fn dimensions(&self, url: &str) -> Option<Dimensions>;
}
