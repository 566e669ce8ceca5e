use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use pulsewatch_market_data::{Aggregator, EngineConfig, MemoryCache};

/// Logs go to stderr; stdout carries one JSON report per cycle.
pub fn init_tracing() {
    let log_format = std::env::var("PW_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_line_number(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

pub fn build_engine(config: &EngineConfig) -> anyhow::Result<Arc<Aggregator>> {
    let engine = Aggregator::from_config(config)
        .context("Failed to assemble provider chains")?
        .with_cache(Arc::new(MemoryCache::new()));
    tracing::info!(
        "Fetch cache enabled (quote TTL {:?}, news TTL {:?}, search TTL {:?})",
        config.cache_ttl.quote,
        config.cache_ttl.news,
        config.cache_ttl.search
    );

    for descriptor in engine.executor().registry().descriptors() {
        tracing::info!(
            "Provider '{}' enabled (timeout {:?}, {} retries)",
            descriptor.id(),
            descriptor.settings.timeout,
            descriptor.settings.max_retries
        );
    }
    Ok(Arc::new(engine))
}

/// Cancel `token` on Ctrl-C. A second Ctrl-C is left to the default handler.
pub fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown requested, cancelling the running cycle");
                token.cancel();
            }
            Err(e) => tracing::warn!("Could not listen for Ctrl-C: {}", e),
        }
    });
}
