//! Background task removing expired registrations.

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use super::manager::RegistrationManager;

/// Handle on the sweeper task. Dropping it stops the task.
pub struct ExpirationSweeper {
    handle: JoinHandle<()>,
}

impl ExpirationSweeper {
    /// Must be called from within a tokio runtime.
    pub(crate) fn spawn(manager: Weak<RegistrationManager>, interval: Duration) -> Self {
        let period = interval.max(Duration::from_millis(1));
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    debug!("Registration manager dropped, stopping expiration sweeper");
                    break;
                };
                let removed = manager.sweep_expired();
                trace!(removed = removed.len(), "Expiration sweep done");
            }
        });
        debug!(interval_ms = period.as_millis() as u64, "Expiration sweeper started");
        Self { handle }
    }

    pub fn stop(&self) {
        self.handle.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for ExpirationSweeper {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
