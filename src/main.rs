use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::Result;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use storefront_imaging::application::{ImagingContext, ImagingPorts};
use storefront_imaging::domain::ports::ViewportObserver;
use storefront_imaging::infrastructure::{
    CliArgs, DecodeProbe, HeadHintRegistry, HttpImageFetcher, ImagingConfig, PageManifest,
    ScrollViewport, StorageManager,
};

fn init_logging(config: &ImagingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = config.effective_log_path() {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

fn load_config(args: &CliArgs) -> Result<ImagingConfig> {
    let storage = StorageManager::new()?;
    let mut config = storage.load_config(args.config.as_deref())?;
    config.merge_with_args(args);
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();

    let args = CliArgs::parse();
    let config = load_config(&args)?;
    init_logging(&config)?;

    info!(version = storefront_imaging::VERSION, build_mode = %config.build_mode, "Starting");

    let manifest = PageManifest::load(&args.manifest)?;
    let fetcher = Arc::new(HttpImageFetcher::new(config.fetch_config())?);
    let registry = Arc::new(HeadHintRegistry::new());
    let viewport = Arc::new(ScrollViewport::new(
        manifest.viewport.width,
        manifest.viewport.height,
    ));

    let ctx = ImagingContext::new(
        ImagingPorts {
            fetcher: fetcher.clone(),
            format_probe: Arc::new(DecodeProbe::new()),
            telemetry_probe: Arc::new(DecodeProbe::new()),
            hint_sink: registry.clone(),
            connection: fetcher.clone(),
            dimensions: fetcher,
            viewport: Some(viewport.clone() as Arc<dyn ViewportObserver>),
        },
        config.options(),
    );

    let handle = ctx.execute(manifest.images.clone()).await;

    for url in &manifest.images.on_hover {
        handle.hover(url).await;
    }

    let step = args
        .scroll_step
        .filter(|step| *step > 0.0)
        .unwrap_or(manifest.viewport.height);
    let bottom = (manifest.scroll_height() - manifest.viewport.height).max(0.0);
    let mut y = 0.0;
    while y < bottom {
        y = (y + step).min(bottom);
        viewport.scroll_to(y);
    }

    for url in handle.triggered_lazy() {
        if let Err(e) = handle.lazy_outcome(&url).await {
            warn!(url = %url, error = %e, "Lazy image did not load");
        }
    }
    handle.disconnect();

    let urls: Vec<String> = ctx
        .telemetry()
        .metrics()
        .into_iter()
        .map(|metric| metric.url)
        .collect();
    let audit = ctx.telemetry().audit(&urls).await;
    let report = ctx.telemetry().report();
    info!(cache = %ctx.cache().stats(), "Page finished");

    let summary = serde_json::json!({
        "report": report,
        "audit": audit,
        "hints": registry.markup(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
