//! Per-image view state: skeleton, loading, loaded or failed.

use crate::application::ImagingContext;
use crate::application::services::{FallbackLoader, VisibilityTrigger};
use crate::domain::entities::{ImageId, LoadState, PriorityClass, Rect, RootMargin};
use crate::domain::errors::LoadError;

/// What the view currently shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageViewStatus {
    /// Placeholder, nothing requested yet.
    Skeleton,
    /// Placeholder while the load is in flight.
    Loading,
    /// Image shown from `src`.
    Loaded {
        /// URL that actually loaded.
        src: String,
    },
    /// Static error icon.
    Failed(String),
}

impl ImageViewStatus {
    /// Returns true while a placeholder is shown.
    #[must_use]
    pub const fn is_placeholder(&self) -> bool {
        matches!(self, Self::Skeleton | Self::Loading)
    }
}

/// One logical image on the page.
///
/// The view never surfaces errors to its caller; failures become `Failed` state.
pub struct ImageView {
    id: ImageId,
    url: String,
    class: PriorityClass,
    square_expected: bool,
    trigger: Option<VisibilityTrigger>,
    status: ImageViewStatus,
    attempts: u8,
}

impl std::fmt::Debug for ImageView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageView")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("class", &self.class)
            .field("has_trigger", &self.trigger.is_some())
            .field("status", &self.status)
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}

impl ImageView {
    /// Creates a view in the skeleton state.
    #[must_use]
    pub fn new(url: impl Into<String>, class: PriorityClass) -> Self {
        let url = url.into();
        Self {
            id: ImageId::from_url(&url),
            url,
            class,
            square_expected: false,
            trigger: None,
            status: ImageViewStatus::Skeleton,
            attempts: 0,
        }
    }

    /// Warns in telemetry when the loaded image is not square.
    #[must_use]
    pub const fn expect_square(mut self) -> Self {
        self.square_expected = true;
        self
    }

    /// Gates loading on `trigger`.
    #[must_use]
    pub fn with_trigger(mut self, trigger: VisibilityTrigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    /// Observes `bounds` through the context's viewport, with optional overrides.
    ///
    /// Eager classes need no trigger and are left ungated. Without a viewport the
    /// trigger fails open.
    #[must_use]
    pub fn observe(
        self,
        ctx: &ImagingContext,
        bounds: Rect,
        root_margin: Option<RootMargin>,
        threshold: Option<f64>,
    ) -> Self {
        if self.class.is_eager() {
            return self;
        }

        let config = ctx
            .options()
            .visibility
            .with_overrides(root_margin, threshold);
        let trigger = VisibilityTrigger::new(config);
        match ctx.viewport() {
            Some(viewport) => trigger.attach(viewport, bounds),
            None => trigger.fail_open(&LoadError::observer_unavailable(
                "no viewport observer configured",
            )),
        }
        self.with_trigger(trigger)
    }

    /// Stable id derived from the source URL.
    #[must_use]
    pub fn id(&self) -> &ImageId {
        &self.id
    }

    /// Source URL as given, before format negotiation.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Current render state.
    #[must_use]
    pub const fn status(&self) -> &ImageViewStatus {
        &self.status
    }

    /// Load attempts made so far, counting a fallback as a second attempt.
    #[must_use]
    pub const fn attempts(&self) -> u8 {
        self.attempts
    }

    /// Whether the view may request its image now.
    #[must_use]
    pub fn should_load(&self) -> bool {
        let priority = self.class.is_eager();
        self.trigger
            .as_ref()
            .is_none_or(|trigger| trigger.should_load(priority))
    }

    /// Still a skeleton and allowed to load.
    #[must_use]
    pub fn needs_load(&self) -> bool {
        self.status == ImageViewStatus::Skeleton && self.should_load()
    }

    /// Marks a request as in flight.
    pub fn set_loading(&mut self) {
        self.status = ImageViewStatus::Loading;
    }

    /// Shows the image from `src`.
    pub fn set_loaded(&mut self, src: impl Into<String>) {
        self.status = ImageViewStatus::Loaded { src: src.into() };
    }

    /// Shows the error state.
    pub fn set_failed(&mut self, error: impl Into<String>) {
        self.status = ImageViewStatus::Failed(error.into());
    }

    /// Requests the image if it is due, applying the WebP fallback.
    ///
    /// Does nothing while gated or once a load has settled.
    pub async fn load(&mut self, loader: &FallbackLoader) -> &ImageViewStatus {
        if !self.needs_load() {
            return &self.status;
        }

        self.set_loading();
        let outcome = loader
            .load_with(&self.url, self.class.is_high(), self.square_expected)
            .await;
        self.attempts = self.attempts.saturating_add(outcome.attempts);

        match outcome.result {
            Ok(()) => self.set_loaded(outcome.resolved),
            Err(e) => self.set_failed(e.to_string()),
        }
        &self.status
    }

    /// Adopts a cache state for `src`, for loads started elsewhere.
    pub fn sync(&mut self, state: &LoadState) {
        if state.is_loaded {
            self.set_loaded(state.url.clone());
        } else if state.is_loading {
            self.set_loading();
        } else if let Some(error) = &state.error
            && self.status == ImageViewStatus::Loading
        {
            self.set_failed(error.clone());
        }
    }

    /// Markup for the current status.
    #[must_use]
    pub fn markup(&self, alt: &str) -> String {
        let alt = escape(alt);
        match &self.status {
            ImageViewStatus::Skeleton | ImageViewStatus::Loading => {
                format!("<div class=\"image-skeleton\" aria-busy=\"true\" aria-label=\"{alt}\"></div>")
            }
            ImageViewStatus::Loaded { src } => {
                let mut tag = format!("<img src=\"{}\" alt=\"{alt}\"", escape(src));
                if self.class.is_high() {
                    tag.push_str(" fetchpriority=\"high\" loading=\"eager\"");
                } else if !self.class.is_eager() {
                    tag.push_str(" loading=\"lazy\"");
                }
                tag.push_str(" decoding=\"async\">");
                tag
            }
            ImageViewStatus::Failed(_) => {
                format!("<div class=\"image-error\" role=\"img\" aria-label=\"{alt}\"></div>")
            }
        }
    }
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
