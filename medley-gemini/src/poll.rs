//! Readiness polling for uploaded media.
//!
//! Video uploads stay in the `PROCESSING` state for a while before they can
//! be referenced from a generation request. This module waits for the
//! transition out of that state with a bounded, cancellable retry loop
//! instead of an unconditional sleep.

use crate::{FileHandle, FileState, InferenceClient};
use medley_common::{ChatError, Config, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Timing for the readiness poll loop.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    /// Delay between state queries.
    pub interval: Duration,
    /// Overall budget; exceeding it fails with `ChatError::Timeout`.
    pub deadline: Duration,
}

impl PollConfig {
    /// Derive poll timing from runtime configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: Duration::from_secs(config.poll_interval_secs),
            deadline: Duration::from_secs(config.poll_deadline_secs),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            deadline: Duration::from_secs(600),
        }
    }
}

/// Wait until `file` leaves the pending state.
///
/// Returns the ready handle, or:
/// - `ChatError::MediaProcessingFailed` when the provider reports `FAILED`
/// - `ChatError::Timeout` when the deadline elapses first
/// - `ChatError::Cancelled` when `cancel` fires
///
/// The state already carried by `file` is inspected before any network
/// round-trip, so an upload that comes back `ACTIVE` returns immediately.
pub async fn await_file_active(
    client: &dyn InferenceClient,
    mut file: FileHandle,
    poll: &PollConfig,
    cancel: &CancellationToken,
) -> Result<FileHandle> {
    let deadline = tokio::time::Instant::now() + poll.deadline;
    let mut polls: u32 = 0;

    loop {
        match file.state {
            FileState::Ready => {
                tracing::info!(name = %file.name, polls, "File ready");
                return Ok(file);
            }
            FileState::Failed => {
                tracing::warn!(name = %file.name, polls, "File processing failed");
                return Err(ChatError::MediaProcessingFailed(format!(
                    "provider reported FAILED for {}",
                    file.name
                )));
            }
            FileState::Pending | FileState::Unknown => {}
        }

        tokio::select! {
            // Cancellation and deadline win over another poll round.
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(name = %file.name, polls, "Readiness poll cancelled");
                return Err(ChatError::Cancelled);
            }
            _ = tokio::time::sleep_until(deadline) => {
                tracing::warn!(name = %file.name, polls, "Readiness poll deadline exceeded");
                return Err(ChatError::Timeout);
            }
            _ = tokio::time::sleep(poll.interval) => {
                polls += 1;
                file = client.get_file(&file.name).await?;
                tracing::debug!(name = %file.name, state = ?file.state, polls, "Polled file state");
            }
        }
    }
}
