//! # Voice Tutor Backend
//!
//! HTTP service for spoken tutoring conversations: a client starts a conversation,
//! uploads a short MP3 of what the learner said, and gets back the transcript, the
//! tutor's reply, and the reply as speech.
//!
//! ## Modules:
//! - **config**: layered configuration (defaults, `config.toml`, environment)
//! - **state**: shared application state and metrics
//! - **conversation**: conversation records and the in-memory store
//! - **providers**: transcription, dialogue and speech-synthesis collaborators
//! - **audio**: temporary upload handling
//! - **pipeline**: the upload → transcript → reply → speech flow
//! - **handlers**, **health**, **routes**: the HTTP surface
//! - **middleware**: request logging and metrics
//! - **error**: error types and their HTTP rendering

mod audio;
mod config;
mod conversation;
mod error;
mod handlers;
mod health;
mod middleware;
mod pipeline;
mod providers;
mod routes;
mod state;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use config::AppConfig;
use state::AppState;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// ISO-8601 UTC with millisecond precision, as used in every response body.
pub(crate) fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[actix_web::main]
async fn main() -> Result<()> {
    // It's fine if there's no .env file
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting voice-tutor-backend v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);
    if !config.provider.has_api_key() {
        warn!("OPENAI_API_KEY is not set; /record and /test-openai will fail until it is");
    }

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let app_state = AppState::from_config(config)?;
    app_state
        .upload_policy
        .ensure_dir()
        .await
        .with_context(|| format!("creating upload dir {}", app_state.upload_policy.dir.display()))?;

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            // Middleware runs in reverse order for responses
            .wrap(cors)
            .wrap(Logger::default())
            .wrap(middleware::MetricsMiddleware)
            .wrap(middleware::RequestLogging)
            .configure(routes::configure)
    })
    .bind(&bind_addr)?
    .disable_signals()
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// `RUST_LOG` wins; otherwise debug for this crate and info for actix.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voice_tutor_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Resolves on SIGINT or SIGTERM (Ctrl+C only off unix).
///
/// If a handler can't be installed the error is logged and that signal is ignored.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => Some(s),
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                None
            }
        };

        let terminate = async {
            match sigterm.as_mut() {
                Some(s) => {
                    s.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = terminate => info!("Received SIGTERM"),
            _ = ctrl_c() => info!("Received SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c().await;
        info!("Received Ctrl+C");
    }
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
