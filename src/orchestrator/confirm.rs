//! Issuance confirmation hook.

use crate::error::OrchestrationError;
use crate::hazard::HazardRecord;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::task::block_in_place;

/// Asked once per issuing batch, before its first generator is dispatched.
pub trait IssueConfirmer: Send + Sync {
    fn confirm(&self, events: &[HazardRecord]) -> Result<bool, OrchestrationError>;
}

/// Accepts every batch. For headless operation.
pub struct AutoConfirm;

impl IssueConfirmer for AutoConfirm {
    fn confirm(&self, _events: &[HazardRecord]) -> Result<bool, OrchestrationError> {
        Ok(true)
    }
}

/// Prompts on the controlling terminal. On a multi-thread runtime the
/// prompt moves off the async worker with `block_in_place`.
pub struct TerminalConfirmer;

impl IssueConfirmer for TerminalConfirmer {
    fn confirm(&self, events: &[HazardRecord]) -> Result<bool, OrchestrationError> {
        use dialoguer::Confirm;

        let listing: Vec<String> = events
            .iter()
            .map(|e| {
                format!(
                    "  {} {} ({})",
                    e.event_id,
                    e.hazard_type().unwrap_or_default(),
                    e.status.as_str()
                )
            })
            .collect();
        let prompt = format!("Issue the following hazards?\n{}\n", listing.join("\n"));
        off_worker(move || Confirm::new().with_prompt(prompt).default(false).interact())
            .map_err(|e| OrchestrationError::ConfigError(format!("Failed to get user input: {}", e)))
    }
}

/// Run a blocking call without stalling other tasks on a multi-thread
/// runtime. Current-thread runtimes cannot hand the worker off, so the call
/// runs in place there.
fn off_worker<F, R>(call: F) -> R
where
    F: FnOnce() -> R,
{
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => block_in_place(call),
        _ => call(),
    }
}

/// Answers with a fixed decision and counts how often it was asked.
pub struct CountingConfirmer {
    answer: bool,
    asked: AtomicUsize,
}

impl CountingConfirmer {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            asked: AtomicUsize::new(0),
        }
    }

    pub fn times_asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

impl IssueConfirmer for CountingConfirmer {
    fn confirm(&self, _events: &[HazardRecord]) -> Result<bool, OrchestrationError> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer)
    }
}
