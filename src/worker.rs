//! Background execution with a periodic "still working" signal.
//!
//! The pipeline is spawned on its own tokio task so a slow model or host
//! never blocks the caller's event loop. While it runs, the caller's
//! [`WorkingIndicator`] is pinged at a fixed interval.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::{JoinError, JoinHandle};

use crate::pipeline::PatchPipeline;

/// Front-end hook for "still working" feedback (a typing indicator, a
/// spinner, a log line).
#[async_trait]
pub trait WorkingIndicator: Send + Sync {
    async fn still_working(&self);
}

/// Indicator that emits a log line per beat.
pub struct LogIndicator;

#[async_trait]
impl WorkingIndicator for LogIndicator {
    async fn still_working(&self) {
        tracing::info!("patch run still in progress");
    }
}

/// Spawn one pipeline run in the background; the task resolves to the
/// run's result message.
///
/// Dropping the returned handle detaches the task; it keeps running and its
/// remote writes are not cancelled.
pub fn spawn_pipeline(pipeline: Arc<PatchPipeline>, instruction: String) -> JoinHandle<String> {
    tokio::spawn(async move { pipeline.run(&instruction).await })
}

/// Spawn `work` and wait for it, pinging `indicator` every `interval`
/// until it finishes.
///
/// The first beat fires immediately. If the caller stops polling this
/// future, only the waiting stops; the spawned task runs to completion.
pub async fn run_with_heartbeat<F>(
    work: F,
    indicator: &dyn WorkingIndicator,
    interval: Duration,
) -> Result<F::Output, JoinError>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let mut handle = tokio::spawn(work);
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = ticker.tick() => indicator.still_working().await,
            joined = &mut handle => return joined,
        }
    }
}

/// [`run_with_heartbeat`] for a chat-style caller that only wants the
/// result message.
pub async fn run_pipeline_with_heartbeat(
    pipeline: Arc<PatchPipeline>,
    instruction: String,
    indicator: &dyn WorkingIndicator,
    interval: Duration,
) -> String {
    let work = async move { pipeline.run(&instruction).await };
    match run_with_heartbeat(work, indicator, interval).await {
        Ok(message) => message,
        Err(e) => {
            tracing::error!(error = %e, "pipeline task ended abnormally");
            "The patch run stopped unexpectedly. Please try again.".to_string()
        }
    }
}
