//! Periodic background tasks with retry backoff
//!
//! A failing iteration is retried with exponential backoff instead of
//! waiting for the next regular tick. Failures never stop the task; only
//! the shutdown signal does.
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Backoff configuration for a periodic task
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay between successful iterations
    pub interval: Duration,
    /// First delay after a failure
    pub initial_retry_delay: Duration,
    /// Upper bound for the failure delay
    pub max_retry_delay: Duration,
    /// Consecutive failures after which every further failure logs at error level
    pub alert_after_failures: u32,
}

impl RetryPolicy {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            initial_retry_delay: Duration::from_secs(1),
            max_retry_delay: interval.max(Duration::from_secs(60)),
            alert_after_failures: 5,
        }
    }
}

#[derive(Debug)]
struct BackoffState {
    consecutive_failures: u32,
    current_retry_delay: Duration,
}

impl BackoffState {
    fn new(initial_delay: Duration) -> Self {
        Self {
            consecutive_failures: 0,
            current_retry_delay: initial_delay,
        }
    }

    /// Delay to wait before the next attempt
    fn record_failure(&mut self, max_delay: Duration) -> Duration {
        let delay = self.current_retry_delay;
        self.consecutive_failures += 1;
        self.current_retry_delay = std::cmp::min(self.current_retry_delay * 2, max_delay);
        delay
    }

    fn reset(&mut self, initial_delay: Duration) {
        self.consecutive_failures = 0;
        self.current_retry_delay = initial_delay;
    }
}

/// Run `task_fn` every `policy.interval` until `shutdown` turns true
/// (or its sender is dropped)
pub async fn run_periodic<F, Fut>(
    task_name: &str,
    policy: RetryPolicy,
    mut shutdown: watch::Receiver<bool>,
    mut task_fn: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), String>>,
{
    let mut state = BackoffState::new(policy.initial_retry_delay);
    info!("Task '{}' started (every {:?})", task_name, policy.interval);

    loop {
        if *shutdown.borrow() {
            break;
        }

        let delay = match task_fn().await {
            Ok(()) => {
                if state.consecutive_failures > 0 {
                    warn!(
                        "Task '{}' recovered after {} failures",
                        task_name, state.consecutive_failures
                    );
                }
                state.reset(policy.initial_retry_delay);
                policy.interval
            }
            Err(e) => {
                let delay = state.record_failure(policy.max_retry_delay);
                if state.consecutive_failures >= policy.alert_after_failures {
                    error!(
                        "Task '{}' failing repeatedly ({} in a row): {}",
                        task_name, state.consecutive_failures, e
                    );
                } else {
                    warn!(
                        "Task '{}' failed (attempt {}): {}, retrying in {:?}",
                        task_name, state.consecutive_failures, e, delay
                    );
                }
                delay
            }
        };

        tokio::select! {
            _ = sleep(delay) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    debug!("Task '{}' lost its shutdown sender", task_name);
                    break;
                }
            }
        }
    }

    info!("Task '{}' stopped", task_name);
}
