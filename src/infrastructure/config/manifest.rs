//! Page manifest: the images of one storefront page, by priority class.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::application::services::LoadPlan;

use super::storage::ConfigError;

/// Size of the simulated browser window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportSize {
    /// Width in pixels.
    pub width: f64,
    /// Height in pixels.
    pub height: f64,
}

impl Default for ViewportSize {
    fn default() -> Self {
        Self {
            width: 1280.0,
            height: 800.0,
        }
    }
}

/// A page to load.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageManifest {
    /// Window size.
    #[serde(default)]
    pub viewport: ViewportSize,

    /// Total page height; defaults to the bottom of the lowest lazy image.
    #[serde(default)]
    pub page_height: Option<f64>,

    /// Images by priority class.
    #[serde(default)]
    pub images: LoadPlan,
}

impl PageManifest {
    /// Reads a manifest from `path`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or is not a valid manifest.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let manifest: Self = toml::from_str(&content)?;
        info!(
            path = %path.display(),
            images = manifest.images.len(),
            "Loaded page manifest"
        );
        Ok(manifest)
    }

    /// Height the visitor can scroll through.
    #[must_use]
    pub fn scroll_height(&self) -> f64 {
        self.page_height.unwrap_or_else(|| {
            self.images
                .lazy
                .iter()
                .filter_map(|image| image.bounds)
                .map(|bounds| bounds.bottom())
                .fold(self.viewport.height, f64::max)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const MANIFEST: &str = r#"
        [viewport]
        width = 1024
        height = 768

        [images]
        hero = ["https://images.unsplash.com/photo-1"]
        above_fold = ["https://cdn.shopify.com/s/files/a.jpg"]
        on_hover = ["https://cdn.shopify.com/s/files/a-alt.jpg"]

        [[images.lazy]]
        url = "https://res.cloudinary.com/demo/image/upload/shoe.jpg"
        bounds = { x = 0, y = 2400, width = 300, height = 300 }

        [[images.lazy]]
        url = "/static/footer.png"
    "#;

    #[test]
    fn test_load_manifest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("page.toml");
        fs::write(&path, MANIFEST).unwrap();

        let manifest = PageManifest::load(&path).unwrap();

        assert_eq!(manifest.viewport.width, 1024.0);
        assert_eq!(manifest.images.hero.len(), 1);
        assert_eq!(manifest.images.lazy.len(), 2);
        assert!(manifest.images.lazy[1].bounds.is_none());
        assert_eq!(manifest.scroll_height(), 2700.0);
    }

    #[test]
    fn test_invalid_manifest_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("page.toml");
        fs::write(&path, "[images]\nhero = 3").unwrap();

        assert!(matches!(
            PageManifest::load(&path),
            Err(ConfigError::TomlDe(_))
        ));
    }
}
