//! Storefront image loading.
//!
//! Loads a page's images in priority order: hero images first, then above-the-fold and
//! critical ones, with hover and lazy images deferred until they are wanted. Requests
//! are deduplicated, rewritten to WebP where the host can serve it, and timed.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Application layer containing the imaging services.
pub mod application;
/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing adapters for the host environment.
pub mod infrastructure;
/// Presentation layer containing the per-image view.
pub mod presentation;

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "storefront-imaging";
