//! Document-head hint targets.

pub mod head_registry;

pub use head_registry::HeadHintRegistry;
