//! Chatline - terminal client for a streaming chat backend
//!
//! Drives one conversational turn at a time against the backend's streaming
//! endpoint, keeps the transcript and tool activity locally, and watches
//! backend health in the background.

mod backend;
mod config;
mod health;
mod location;
mod repl;
mod runtime;
mod state_machine;
mod tools;

use backend::{HttpBackend, LoggingBackend};
use config::ClientConfig;
use health::HealthMonitor;
use location::SessionLocation;
use repl::Repl;
use runtime::{SessionController, SessionSettings};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so they never interleave with the transcript
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatline=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = ClientConfig::from_env();
    tracing::info!(
        url = %config.base_url,
        model = ?config.model,
        tools_enabled = config.tools_enabled,
        "Starting chatline"
    );

    let http = Arc::new(HttpBackend::new(
        &config.base_url,
        config.conversation_limit,
    )?);
    let backend = Arc::new(LoggingBackend::new(Arc::clone(&http)));

    let health = HealthMonitor::spawn(Arc::clone(&backend), config.health_interval);

    let location = SessionLocation::new(&config.session_file);
    let resume = location.load().unwrap_or_else(|e| {
        tracing::warn!(path = %location.path().display(), error = %e, "Ignoring session file");
        None
    });

    let session = SessionController::new(
        backend,
        http,
        SessionSettings {
            tools_enabled: config.tools_enabled,
            model: config.model.clone(),
        },
    )
    .with_location(location);

    if let Some(id) = resume {
        match session.select_conversation(&id).await {
            Ok(()) => println!("Resumed conversation {id}."),
            Err(e) => {
                tracing::warn!(conv_id = %id, error = %e, "Could not resume conversation");
                session.clear_conversation();
            }
        }
    }
    if let Err(e) = session.refresh_conversations().await {
        tracing::warn!(error = %e, "Could not load conversation index");
    }

    Repl::new(session, health).run().await?;
    Ok(())
}
