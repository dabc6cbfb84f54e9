mod config;
mod digest;
mod dispatch;
mod llm;
mod scheduler;
mod server;
mod whatsapp;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::llm::{GeminiClient, TextGenerator};
use crate::scheduler::Scheduler;
use crate::whatsapp::{EvolutionClient, MessageSender};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tiabot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from the environment
    let config = Config::from_env().context("Failed to load configuration")?;

    info!("Configuration loaded");
    info!("  Model: {}", config.llm.model);
    info!("  Trigger: {} (group only: {})", config.trigger.token, config.trigger.group_only);
    info!("  Evolution instance: {}", config.whatsapp.instance);
    match &config.digest.group_jid {
        Some(jid) => info!(
            "  Digest: {:02}:{:02} → {} ({} locations)",
            config.digest.hour,
            config.digest.minute,
            jid,
            config.digest.locations.len()
        ),
        None => warn!("  Digest: disabled (GROUP_JID not set)"),
    }

    let generator: Arc<dyn TextGenerator> = Arc::new(GeminiClient::new(config.llm.clone()));
    let sender: Arc<dyn MessageSender> = Arc::new(EvolutionClient::new(config.whatsapp.clone()));
    let dispatcher = Arc::new(Dispatcher::new(&config, generator.clone(), sender.clone()));

    // Daily digest runs on the scheduler, independent of the webhook path
    let sched = Scheduler::new().await?;
    scheduler::schedule_daily_digest(&sched, Arc::new(config.clone()), generator, sender).await?;
    sched.start().await?;

    let app = server::router(dispatcher);
    let addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("Webhook server listening on {addr}");
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
