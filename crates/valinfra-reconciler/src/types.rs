//! Configuration and reporting types for the reconciler.

use std::time::Duration;

use valinfra_core::SnapshotId;

/// Reconciler configuration.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Time between the starts of two passes.
    pub period: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(3600),
        }
    }
}

impl ReconcilerConfig {
    /// Create configuration from environment variables.
    ///
    /// Reads `RECONCILE_PERIOD_SECONDS`; missing, zero or unparseable values keep the default.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("RECONCILE_PERIOD_SECONDS") {
            if let Ok(n) = val.parse::<u64>() {
                if n > 0 {
                    config.period = Duration::from_secs(n);
                }
            }
        }

        config
    }
}

/// Snapshots picked by one selection step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Snapshots whose schedule fires within the coming period.
    pub due: Vec<SnapshotId>,
    /// Snapshots skipped because their schedule could not be evaluated.
    pub skipped: usize,
}

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Refreshable snapshots with a schedule.
    pub candidates: usize,
    /// Candidates found due.
    pub due: usize,
    /// Due snapshots actually marked pending.
    pub marked: usize,
    /// Update commands published.
    pub sent: usize,
    /// Marked snapshots whose command could not be built or published.
    pub failed: usize,
    /// Candidates skipped because of an invalid schedule.
    pub skipped: usize,
}
