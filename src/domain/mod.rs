//! Domain layer with image-loading entities and port definitions.

/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Port definitions.
pub mod ports;

pub use entities::{ImageFormat, LoadState, PriorityClass};
pub use errors::{LoadError, LoadResult};
pub use ports::{ImageFetcher, ViewportObserver};
