//! Image handling infrastructure.
//!
//! This module provides:
//! - HTTP fetching with priority-aware throttling and decode verification
//! - Format capability probing with embedded samples

pub mod decode_probe;
pub mod http_fetcher;

pub use decode_probe::DecodeProbe;
pub use http_fetcher::{FetchConfig, HttpImageFetcher};
