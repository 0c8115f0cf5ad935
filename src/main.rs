use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use vantage_auth::{AuthGate, TokenConfig};
use vantage_pipeline::{EventIngestor, ScoringConfig, ScoringEngine, SessionCorrelator};
use vantage_server::{AppState, ServerConfig};
use vantage_settings::load_settings;
use vantage_store::{PoolConfig, SessionRepo, Store, TenantRepo, UserRepo};
use vantage_telemetry::{init_telemetry, TelemetryConfig};

#[derive(Parser, Debug)]
#[command(name = "vantage", about = "Multi-tenant visitor analytics service")]
struct Cli {
    /// Path to a JSON settings file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the listen port.
    #[arg(long)]
    port: Option<u16>,

    /// Emit JSON log lines.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_telemetry(&TelemetryConfig {
        json_output: cli.json_logs,
        ..TelemetryConfig::default()
    });

    let mut settings = match load_settings(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("vantage: {e}");
            std::process::exit(1);
        }
    };
    if let Some(port) = cli.port {
        settings.server.port = port;
    }

    tracing::info!("Starting Vantage server");

    let store = Store::open(
        std::path::Path::new(&settings.database.path),
        &PoolConfig {
            pool_size: settings.database.pool_size,
            busy_timeout_ms: settings.database.busy_timeout_ms,
        },
    )
    .expect("Failed to open store");

    let tenants = TenantRepo::new(store.clone());
    let users = UserRepo::new(store.clone());
    let sessions = SessionRepo::new(store.clone());

    let gate = Arc::new(AuthGate::new(
        users,
        tenants.clone(),
        TokenConfig {
            secret: settings.auth.token_secret.clone(),
            ttl_secs: settings.auth.token_ttl_secs,
        },
    ));

    let correlator = SessionCorrelator::new(sessions.clone());
    let ingestor = Arc::new(EventIngestor::new(tenants, correlator));

    let scoring = Arc::new(ScoringEngine::new(ScoringConfig {
        visit_weight: settings.scoring.visit_weight,
        recency_weight: settings.scoring.recency_weight,
        diversity_weight: settings.scoring.diversity_weight,
        warm_threshold: settings.scoring.warm_threshold,
        hot_threshold: settings.scoring.hot_threshold,
        recency_half_life_hours: settings.scoring.recency_half_life_hours,
    }));

    let state = AppState {
        gate,
        ingestor,
        sessions,
        scoring,
        store,
    };

    let config = ServerConfig {
        host: settings.server.host.clone(),
        port: settings.server.port,
    };
    let _handle = vantage_server::start(config, state)
        .await
        .expect("Failed to start server");

    tracing::info!(port = settings.server.port, "Vantage server ready");

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for ctrl+c");

    tracing::info!("Shutting down");
}
