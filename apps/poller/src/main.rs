mod main_lib;
mod scheduler;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use main_lib::{build_engine, cancel_on_ctrl_c, init_tracing};
use pulsewatch_market_data::EngineConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = EngineConfig::from_env().context("Invalid configuration")?;
    let engine = build_engine(&config)?;
    tracing::info!(
        "Watching {} symbol(s), categories {:?}",
        config.watchlist.len(),
        config.categories
    );

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let mut stdout = std::io::stdout();
    scheduler::run(
        &engine,
        &config.watchlist,
        config.poll_interval,
        &cancel,
        &mut stdout,
    )
    .await
}
