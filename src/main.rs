use clap::Parser;
use matchx_api::{AppState, RestApi};
use matchx_core::IndexConfig;
use matchx_embed::EmbeddingProvider;
use matchx_engine::{snapshot, EmbedPipeline, MatchStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Semantic matching engine for an internship marketplace
#[derive(Parser, Debug)]
#[command(name = "matchx")]
#[command(about = "Semantic matching engine", long_about = None)]
struct Args {
    /// Path to the data directory
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,

    /// HTTP API port
    #[arg(long, default_value_t = 8080)]
    http_port: u16,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// HNSW graph degree
    #[arg(long, default_value_t = 16)]
    hnsw_m: usize,

    /// HNSW construction search width
    #[arg(long, default_value_t = 64)]
    hnsw_ef_construction: usize,

    /// HNSW query search width
    #[arg(long, default_value_t = 40)]
    hnsw_ef_search: usize,

    /// Collections at or below this size use exact scan instead of HNSW
    #[arg(long, default_value_t = 2000)]
    exact_search_threshold: usize,

    /// Seconds between background snapshots
    #[arg(long, default_value_t = 60)]
    save_interval: u64,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting matchx v{}", env!("CARGO_PKG_VERSION"));
    info!("Data directory: {:?}", args.data_dir);
    info!("HTTP API port: {}", args.http_port);

    let config = IndexConfig {
        m: args.hnsw_m,
        ef_construction: args.hnsw_ef_construction,
        ef_search: args.hnsw_ef_search,
        exact_threshold: args.exact_search_threshold,
        ..IndexConfig::default()
    };

    std::fs::create_dir_all(&args.data_dir)?;
    let snapshot_path = args.data_dir.join("matchx.snapshot");

    let (store, recovered_pending) = if snapshot_path.exists() {
        snapshot::load(&snapshot_path, config)?
    } else {
        (MatchStore::new(config), Vec::new())
    };
    info!(
        "Store initialized: {} postings, {} cvs",
        store.posting_count(),
        store.cv_count()
    );

    let provider = Arc::new(EmbeddingProvider::hashing());
    let pipeline = EmbedPipeline::attach(&store, provider.clone());
    for key in recovered_pending {
        pipeline.schedule(&store, key);
    }

    let _saver = snapshot::spawn_background_save(
        &store,
        snapshot_path.clone(),
        Duration::from_secs(args.save_interval),
    );

    let state = Arc::new(AppState::new(store.clone(), provider));
    info!("HTTP API: http://localhost:{}/", args.http_port);
    RestApi::start(state, args.http_port).await?;

    // HttpServer::run returns after ctrl-c
    info!("Shutting down...");
    pipeline.shutdown();
    if !pipeline.wait_idle(Duration::from_secs(10)) {
        warn!("embedding queue did not drain before shutdown");
    }
    snapshot::save(&store, &snapshot_path)?;
    info!("Final snapshot written to {:?}", snapshot_path);
    Ok(())
}
