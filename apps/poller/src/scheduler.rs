//! Polling loop: one cycle per interval until cancelled.
//!
//! Each cycle's report is written as one JSON line. Credential cooldowns are
//! reset when the UTC day changes, since provider quotas roll over daily.

use std::io::Write;

use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use pulsewatch_market_data::{Aggregator, CycleReport};

/// Run a single cycle when `every` is `None`, otherwise poll until cancelled.
pub async fn run<W: Write>(
    engine: &Aggregator,
    watchlist: &[String],
    every: Option<Duration>,
    cancel: &CancellationToken,
    out: &mut W,
) -> anyhow::Result<()> {
    let Some(every) = every else {
        let report = engine.run_cycle(watchlist, cancel).await;
        return emit(out, &report);
    };

    info!("Polling every {:?}", every);
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut day = Utc::now().date_naive();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Scheduler stopped");
                return Ok(());
            }
            _ = ticker.tick() => {}
        }

        if day_rolled_over(&mut day, Utc::now()) {
            info!("New UTC day {}, resetting credential cooldowns", day);
            engine.executor().rotator().reset_all();
        }

        let report = engine.run_cycle(watchlist, cancel).await;
        emit(out, &report)?;
        if report.cancelled {
            return Ok(());
        }
        debug!("Next cycle in {:?}", every);
    }
}

/// Advance `day` to `now`'s UTC date. True when it changed.
fn day_rolled_over(day: &mut NaiveDate, now: DateTime<Utc>) -> bool {
    let today = now.date_naive();
    if today == *day {
        return false;
    }
    *day = today;
    true
}

fn emit<W: Write>(out: &mut W, report: &CycleReport) -> anyhow::Result<()> {
    serde_json::to_writer(&mut *out, report).context("Failed to serialize cycle report")?;
    writeln!(out)?;
    out.flush()?;
    Ok(())
}
