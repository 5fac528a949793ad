use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ocrgate::api::{create_router, AppState};
use ocrgate::auth::{AuthGate, Credentials};
use ocrgate::config::Config;
use ocrgate::ocr::BackendFactory;

#[derive(Parser)]
#[command(name = "ocrgate")]
#[command(about = "Authenticated HTTP gateway for pluggable OCR backends")]
struct Args {
    /// Address to bind (overrides OCR_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides OCR_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Load a backend's default model before accepting requests (repeatable)
    #[arg(long = "preload", value_name = "BACKEND")]
    preload: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    dotenvy::dotenv().ok();

    let mut config = Config::from_env();
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ocrgate=info,tower_http=debug".into());
    if config.server.log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let credentials = Credentials::load(&config.auth.credentials_path)?;
    let auth = AuthGate::new(&credentials, config.auth.enforce);
    if !auth.is_enforcing() {
        tracing::warn!(
            "OCR_AUTH_ENFORCE=false: authentication is DISABLED and every request is accepted. Do not expose this server."
        );
    }

    tokio::fs::create_dir_all(&config.ocr.output_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create output directory {}",
                config.ocr.output_dir.display()
            )
        })?;

    tracing::info!(
        configs = %config.ocr.configs_path,
        default_backend = %config.ocr.default_backend,
        output_dir = %config.ocr.output_dir.display(),
        "Initializing OCR backends..."
    );
    let factory = Arc::new(BackendFactory::new(config.ocr.configs_path.clone()));
    let state = AppState::new(config.clone(), auth, factory);

    for backend in &args.preload {
        let empty: [&str; 0] = [];
        state
            .models
            .resolve(backend, &empty)
            .await
            .with_context(|| format!("Failed to preload backend '{backend}'"))?;
    }
    if !state.models.is_empty() {
        tracing::info!(models = ?state.models.loaded_keys(), "Preloaded models");
    }

    let app = create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("ocrgate starting on http://{}", addr);
    tracing::info!("  OCR endpoint: POST http://{}/ocr", addr);
    tracing::info!("  Test form:    http://{}/ocr_test", addr);
    tracing::info!("  Health check: http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, stopping server...");
}
