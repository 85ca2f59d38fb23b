use std::sync::Arc;

use study_companion_backend::config::Config;
use study_companion_backend::create_app;
use study_companion_backend::db::Database;
use study_companion_backend::logging::init_tracing;
use study_companion_backend::services::llm_provider::{LLMConfig, LLMProvider, TextGenerator};
use study_companion_backend::services::youtube::YouTubeTranscripts;
use study_companion_backend::state::AppState;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            std::process::exit(1);
        }
    };

    let _log_guard = init_tracing(&config.logging);
    if config.auth.using_dev_secret {
        tracing::warn!("JWT_SECRET is not set, using the development secret");
    }

    let db = match Database::connect(&config.database).await {
        Ok(db) => db,
        Err(err) => {
            tracing::error!(error = %err, url = %config.database.url, "database initialization failed");
            std::process::exit(1);
        }
    };

    let llm_config = LLMConfig::from_env();
    let transcript_timeout = llm_config.timeout;
    let provider = LLMProvider::new(llm_config);
    if provider.is_available() {
        tracing::info!(model = %provider.model(), "text generation enabled");
    } else {
        tracing::warn!("LLM_API_KEY is not set, AI features are disabled");
    }

    let transcripts = YouTubeTranscripts::new(transcript_timeout);

    let state = AppState::new(db, config.auth.clone(), Arc::new(provider), Arc::new(transcripts));
    let app = create_app(state, &config.cors_origins);

    let addr = config.bind_addr();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, %addr, "bind listener failed");
            std::process::exit(1);
        }
    };
    tracing::info!(%addr, "study companion backend listening");

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    if let Err(e) = server.await {
        tracing::error!(error = %e, "server error");
    }

    tracing::info!("Graceful shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
