//! Background scheduler for the period sweep.
//!
//! Runs the orchestrator on a fixed interval so periods close and open
//! without any user traffic. Missed ticks are harmless: each sweep catches up
//! every goal to the current instant.

use std::sync::Arc;

use chainforge_core::group_goals::SweepOptions;
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{info, warn};

use crate::main_lib::AppState;

/// Starts the background sweep scheduler.
///
/// The loop exits once `shutdown` flips to `true`. A sweep that is running at
/// that moment stops dispatching new goals and lets in-flight ones finish.
pub fn start_period_sweep_scheduler(
    state: Arc<AppState>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Period sweep scheduler started ({}s interval)",
            state.sweep.interval.as_secs()
        );

        tokio::select! {
            _ = sleep(state.sweep.initial_delay) => {}
            _ = shutdown.changed() => {
                info!("Period sweep scheduler stopped before its first run");
                return;
            }
        }

        // First tick is immediate, subsequent ticks are one interval apart.
        let mut ticker = interval(state.sweep.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => run_scheduled_sweep(&state, shutdown.clone()).await,
                changed = shutdown.changed() => {
                    // The sender is gone; nobody can signal us any more.
                    if changed.is_err() {
                        break;
                    }
                }
            }
            if *shutdown.borrow() {
                break;
            }
        }
        info!("Period sweep scheduler stopped");
    })
}

/// Runs a single scheduled sweep.
async fn run_scheduled_sweep(state: &Arc<AppState>, shutdown: watch::Receiver<bool>) {
    let options = SweepOptions {
        dry_run: false,
        timeout: Some(state.sweep.timeout),
    };
    match state
        .orchestrator
        .sweep(Utc::now(), options, Some(shutdown))
        .await
    {
        Ok(report) => {
            if report.goals_failed > 0 {
                warn!(
                    "Scheduled sweep completed with {} failed goals",
                    report.goals_failed
                );
            }
        }
        Err(e) => warn!("Scheduled sweep failed: {}", e),
    }
}
