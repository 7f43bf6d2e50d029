mod format_probe_port;
mod hint_sink_port;
mod image_fetcher_port;
mod network_port;
mod viewport_port;

pub use format_probe_port::FormatProbe;
pub use hint_sink_port::HintSink;
pub use image_fetcher_port::{FetchedImage, ImageFetcher};
pub use network_port::{ConnectionProbe, DimensionProbe};
pub use viewport_port::{IntersectionCallback, ObservationId, ViewportObserver};
