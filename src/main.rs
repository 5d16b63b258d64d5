//! lesion-diff - Longitudinal tumor-mask comparison.
//!
//! This binary runs the HTTP service or a one-off comparison.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lesion_diff::{
    compare::{ComparisonEngine, ComparisonRequest, ResultCache},
    config::{Cli, Command, CompareConfig, EngineConfig, ServeConfig, SourceConfig},
    create_s3_client,
    server::{create_router, AppState, RouterConfig},
    diff::format_area,
    CompareError, HttpMaskSource, IoError, JsonStudyCatalog, LocalMaskSource, RoutingMaskSource,
    S3MaskSource, StudyCatalog,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Compare(config) => run_compare(config).await,
    }
}

// =============================================================================
// Shared Setup
// =============================================================================

/// Build the locator-routed mask source from CLI settings.
async fn build_mask_source(config: &SourceConfig) -> Result<RoutingMaskSource, IoError> {
    let local = match config.mask_root {
        Some(ref root) => LocalMaskSource::with_root(root),
        None => LocalMaskSource::new(),
    };

    let http = HttpMaskSource::with_timeout(config.fetch_timeout())?;

    let mut source = RoutingMaskSource::new().with_local(local).with_http(http);

    if !config.no_s3 {
        let client = create_s3_client(config.s3_endpoint.as_deref(), &config.s3_region).await;
        source = source.with_s3(S3MaskSource::new(client, config.s3_bucket.clone()));
    }

    Ok(source)
}

fn log_engine_config(engine: &EngineConfig) {
    let (width, height) = engine.canonical_dimensions();
    info!("  Canonical size: {}x{}", width, height);
    info!("  Threshold: > {}", engine.threshold);
    info!("  Calibration: {} px/cm²", engine.calibration_factor);
    if engine.calibration_resolution_mismatch() {
        warn!(
            "  Canonical size differs from 256x256; areas still use {} px/cm²",
            engine.calibration_factor
        );
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    // Initialize logging
    init_logging(config.verbose);

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    print_banner();

    info!("Configuration:");
    log_engine_config(&config.engine);
    match config.source.mask_root {
        Some(ref root) => info!("  Mask root: {}", root.display()),
        None => info!("  Mask root: (plain paths)"),
    }
    if config.source.no_s3 {
        info!("  S3: disabled");
    } else {
        info!("  S3 region: {}", config.source.s3_region);
        if let Some(ref endpoint) = config.source.s3_endpoint {
            info!("  S3 endpoint: {}", endpoint);
        }
        if let Some(ref bucket) = config.source.s3_bucket {
            info!("  S3 default bucket: {}", bucket);
        }
    }
    if config.cache_results == 0 {
        info!("  Result cache: disabled");
    } else {
        info!("  Result cache: {}MB", config.cache_results / (1024 * 1024));
    }
    info!("  Viewers: {}", config.max_viewers);

    let source = match build_mask_source(&config.source).await {
        Ok(source) => source,
        Err(e) => {
            error!("Failed to set up mask sources: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let engine = ComparisonEngine::with_cache(
        source,
        Arc::new(config.engine.clone()),
        ResultCache::with_capacity(config.cache_results),
    );

    let mut app_state = AppState::new(engine).with_max_viewers(config.max_viewers);

    // Load catalog
    if let Some(ref path) = config.catalog {
        match JsonStudyCatalog::load(path).await {
            Ok(catalog) => {
                info!(
                    "  Catalog: {} patient(s), {} study(ies) from {}",
                    catalog.patient_count(),
                    catalog.study_count(),
                    path.display()
                );
                let catalog: Arc<dyn StudyCatalog> = Arc::new(catalog);
                app_state = app_state.with_catalog(catalog);
            }
            Err(e) => {
                error!("Failed to load catalog: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        warn!("  Catalog: none - /patients endpoints are unavailable");
    }

    let router = create_router(app_state, build_router_config(&config));

    // Bind and serve
    let addr = config.bind_address();

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/health", addr);
    info!(
        "    curl 'http://{}/compare?baseline=<mask>&follow_up=<mask>'",
        addr
    );
    if config.catalog.is_some() {
        info!("    curl http://{}/patients/<patient_id>/compare", addr);
    }
    info!("────────────────────────────────────────────────────────────────");
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Print the startup banner.
fn print_banner() {
    let version = env!("CARGO_PKG_VERSION");
    info!("");
    info!("┬  ┌─┐┌─┐┬┌─┐┌┐┌   ┌┬┐┬┌─┐┌─┐");
    info!("│  ├┤ └─┐││ ││││───│││├┤ ├┤ ");
    info!("┴─┘└─┘└─┘┴└─┘┘└┘  ─┴┘┴└  └  ");
    info!("                         v{}", version);
    info!("");
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "lesion_diff=debug,tower_http=debug"
    } else {
        "lesion_diff=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = RouterConfig::new();

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config.with_tracing(!config.no_tracing)
}

// =============================================================================
// Compare Command
// =============================================================================

async fn run_compare(config: CompareConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let source = match build_mask_source(&config.source).await {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let engine = ComparisonEngine::new(source, Arc::new(config.engine.clone()));

    let request = ComparisonRequest::new(config.baseline.as_str(), config.follow_up.as_str());
    let result = match engine.compare(request).await {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Comparison unavailable: {}", e);
            if let CompareError::Load(ref load) = e {
                eprintln!("  failing side: {}", load.timepoint());
            }
            return ExitCode::FAILURE;
        }
    };

    if let Some(ref path) = config.overlay {
        let png = match result.overlay_png() {
            Ok(png) => png,
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        };
        if let Err(e) = tokio::fs::write(path, &png).await {
            eprintln!("Error: failed to write {}: {}", path.display(), e);
            return ExitCode::FAILURE;
        }
    }

    let stats = result.statistics();
    if config.json {
        let response = lesion_diff::server::ComparisonResponse::from_result(&result);
        match serde_json::to_string_pretty(&response) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        println!("Baseline:  {}", config.baseline);
        println!("Follow-up: {}", config.follow_up);
        println!("─────────────────────────────────");
        println!(
            "Growth:    {} cm² ({} px)",
            stats.display_growth(),
            stats.growth_pixels()
        );
        println!(
            "Shrinkage: {} cm² ({} px)",
            stats.display_shrinkage(),
            stats.shrinkage_pixels()
        );
        println!("Stable:    {} px", stats.counts.stable);
        match stats.percent_change() {
            Some(percent) => println!(
                "Net:       {} cm² ({:+.2}%)",
                format_area(stats.net_change_cm2()),
                percent
            ),
            None => println!("Net:       {} cm²", format_area(stats.net_change_cm2())),
        }
        if let Some(ref path) = config.overlay {
            println!("Overlay:   {}", path.display());
        }
    }

    ExitCode::SUCCESS
}
