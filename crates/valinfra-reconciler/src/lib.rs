//! Periodic snapshot refresh for valinfra.
//!
//! The reconciler wakes once per period, finds every `CREATED` snapshot whose
//! cron schedule fires before the next pass, marks them `UPDATE_PENDING` in a
//! single batch and sends each an update command.
//!
//! A snapshot is due when its next fire time falls strictly before
//! `now + period`.
//!
//! Passes never overlap: the loop sleeps for the period minus the time the
//! pass took, or not at all if the pass overran.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod types;

pub use error::{ReconcileError, Result};
pub use types::{ReconcileReport, ReconcilerConfig, Selection};

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use valinfra_bus::CommandBus;
use valinfra_control::{commands, lifecycle, CronSchedule};
use valinfra_store::{Snapshot, SnapshotStatus, Store, StoreError, UpdateStatus};

/// Pick the snapshots whose schedule fires within `period` of `now`.
///
/// Snapshots that are not refreshable or carry no schedule are ignored.
/// Unparseable schedules are logged and skipped.
#[must_use]
pub fn select_due(snapshots: &[Snapshot], now: &DateTime<Utc>, period: Duration) -> Selection {
    let mut selection = Selection::default();

    for snapshot in snapshots {
        if !lifecycle::snapshot::is_refreshable(snapshot.status, snapshot.update_status) {
            continue;
        }
        let Some(expression) = snapshot.cron_time.as_deref() else {
            continue;
        };

        match CronSchedule::parse(expression).and_then(|schedule| schedule.is_due(now, period)) {
            Ok(true) => selection.due.push(snapshot.snapshot_id),
            Ok(false) => {}
            Err(e) => {
                warn!(snapshot_id = %snapshot.snapshot_id, error = %e, "Skipping snapshot with invalid schedule");
                selection.skipped += 1;
            }
        }
    }

    selection
}

/// Time to wait before the next pass, given how long this one took.
#[must_use]
pub fn next_delay(period: Duration, elapsed: Duration) -> Duration {
    period.saturating_sub(elapsed)
}

/// Drives scheduled snapshot refreshes.
pub struct Reconciler<S: Store, B: CommandBus> {
    store: Arc<S>,
    bus: Arc<B>,
    config: ReconcilerConfig,
}

impl<S: Store, B: CommandBus> Reconciler<S, B> {
    /// Create a reconciler sharing the service's store and bus.
    #[must_use]
    pub fn new(store: Arc<S>, bus: Arc<B>, config: ReconcilerConfig) -> Self {
        Self { store, bus, config }
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Run one pass as of `now`.
    ///
    /// A snapshot whose update command cannot be built or published is moved to
    /// `UPDATE_FAIL` so a later pass picks it up again.
    ///
    /// # Errors
    ///
    /// Returns an error if the candidate scan or the batch mark fails.
    pub async fn reconcile_once(&self, now: DateTime<Utc>) -> Result<ReconcileReport> {
        let candidates = self.store.list_snapshots_by_status(SnapshotStatus::Created)?;
        let selection = select_due(&candidates, &now, self.config.period);

        let mut report = ReconcileReport {
            candidates: candidates.iter().filter(|s| s.cron_time.is_some()).count(),
            due: selection.due.len(),
            skipped: selection.skipped,
            ..ReconcileReport::default()
        };
        if selection.due.is_empty() {
            return Ok(report);
        }

        let marked = self.store.mark_snapshots_update_pending(&selection.due)?;
        report.marked = marked.len();

        for snapshot in &marked {
            match self.send_update(snapshot).await {
                Ok(()) => {
                    report.sent += 1;
                    debug!(snapshot_id = %snapshot.snapshot_id, "Sent scheduled update");
                }
                Err(e) => {
                    report.failed += 1;
                    error!(snapshot_id = %snapshot.snapshot_id, error = %e, "Scheduled update failed");
                    if let Err(e) = self.mark_failed(snapshot, &e.to_string()) {
                        error!(snapshot_id = %snapshot.snapshot_id, error = %e, "Failed to record update failure");
                    }
                }
            }
        }

        Ok(report)
    }

    async fn send_update(&self, snapshot: &Snapshot) -> Result<()> {
        let config = self
            .store
            .get_network_config(&snapshot.network)?
            .ok_or_else(|| ReconcileError::NetworkNotFound(snapshot.network.clone()))?;
        self.bus
            .send_command(commands::update_snapshot(snapshot, &config))
            .await?;
        Ok(())
    }

    fn mark_failed(&self, snapshot: &Snapshot, reason: &str) -> Result<()> {
        self.store.update_snapshot(&snapshot.snapshot_id, |s| {
            if s.update_status == Some(UpdateStatus::UpdatePending) {
                s.update_status = Some(UpdateStatus::UpdateFail);
                s.update_message = Some(reason.to_string());
                s.update_detail = None;
            }
            Ok::<_, StoreError>(())
        })?;
        Ok(())
    }

    /// Run passes every period until `shutdown` resolves.
    ///
    /// A failed pass is logged and retried on the next period. Shutdown takes
    /// effect between passes.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);
        info!(period_secs = self.config.period.as_secs(), "Starting reconciler");

        loop {
            let started = Instant::now();
            match self.reconcile_once(Utc::now()).await {
                Ok(report) if report.due > 0 || report.skipped > 0 => {
                    info!(
                        candidates = report.candidates,
                        due = report.due,
                        marked = report.marked,
                        sent = report.sent,
                        failed = report.failed,
                        skipped = report.skipped,
                        "Reconciliation pass complete"
                    );
                }
                Ok(report) => debug!(candidates = report.candidates, "Nothing due"),
                Err(e) => error!(error = %e, "Reconciliation pass failed"),
            }

            let delay = next_delay(self.config.period, started.elapsed());
            tokio::select! {
                () = &mut shutdown => {
                    info!("Reconciler shutting down");
                    break;
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;
    use valinfra_bus::MemoryBus;
    use valinfra_control::commands::routing;
    use valinfra_core::{SnapshotId, UserId};
    use valinfra_store::{ChainParams, NetworkSetupConfig, RocksStore};

    const HOUR: Duration = Duration::from_secs(3600);

    fn midnight() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    fn snapshot(seed: u64, cron_time: Option<&str>) -> Snapshot {
        let user = UserId::from_bytes([1u8; 32]);
        let now = midnight();
        Snapshot {
            snapshot_id: SnapshotId::generate_deterministic(&user, "s", seed),
            user_id: user,
            name: format!("s{seed}"),
            network: "cosmoshub-4".to_string(),
            status: SnapshotStatus::Created,
            update_status: None,
            volume_cloud_id: format!("vol-{seed}"),
            snapshot_cloud_id: Some(format!("snap-{seed}")),
            droplet_cloud_id: None,
            tags: Vec::new(),
            cron_time: cron_time.map(str::to_string),
            message: None,
            detail: None,
            update_message: None,
            update_detail: None,
            created_at: now,
            updated_at: now,
            create_processed_at: Some(now),
            delete_processed_at: None,
            update_processed_at: None,
        }
    }

    fn network() -> NetworkSetupConfig {
        NetworkSetupConfig {
            network: "cosmoshub-4".to_string(),
            name: "Cosmos Hub".to_string(),
            container_name: "gaiad".to_string(),
            setup_script: None,
            status_command: None,
            default_size_gigabytes: 400,
            chain: ChainParams {
                chain_id: "cosmoshub-4".to_string(),
                rest_url: "http://127.0.0.1:1317".to_string(),
                denom: "uatom".to_string(),
                decimals: 6,
            },
        }
    }

    fn setup() -> (TempDir, Arc<RocksStore>, Arc<MemoryBus>) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let bus = Arc::new(MemoryBus::new());
        (dir, store, bus)
    }

    #[test]
    fn due_within_the_coming_period() {
        let soon = snapshot(1, Some("30 0 * * *"));
        let later = snapshot(2, Some("0 2 * * *"));
        let unscheduled = snapshot(3, None);

        let selection = select_due(&[soon.clone(), later, unscheduled], &midnight(), HOUR);
        assert_eq!(selection.due, vec![soon.snapshot_id]);
        assert_eq!(selection.skipped, 0);
    }

    #[test]
    fn invalid_schedules_do_not_block_the_batch() {
        let broken = snapshot(1, Some("every tuesday"));
        let soon = snapshot(2, Some("15 0 * * *"));

        let selection = select_due(&[broken, soon.clone()], &midnight(), HOUR);
        assert_eq!(selection.due, vec![soon.snapshot_id]);
        assert_eq!(selection.skipped, 1);
    }

    #[test]
    fn pending_or_unusable_snapshots_are_not_selected() {
        let mut pending = snapshot(1, Some("30 0 * * *"));
        pending.update_status = Some(UpdateStatus::UpdatePending);
        let mut deleting = snapshot(2, Some("30 0 * * *"));
        deleting.status = SnapshotStatus::DeletePending;
        let mut failed = snapshot(3, Some("30 0 * * *"));
        failed.update_status = Some(UpdateStatus::UpdateFail);

        let selection = select_due(&[pending, deleting, failed.clone()], &midnight(), HOUR);
        assert_eq!(selection.due, vec![failed.snapshot_id]);
    }

    #[test]
    fn delay_never_goes_negative() {
        assert_eq!(next_delay(HOUR, Duration::from_secs(600)), Duration::from_secs(3000));
        assert_eq!(next_delay(HOUR, Duration::from_secs(7200)), Duration::ZERO);
    }

    #[tokio::test]
    async fn pass_marks_and_sends_updates() {
        let (_dir, store, bus) = setup();
        store.put_network_config(&network()).unwrap();
        let soon = snapshot(1, Some("30 0 * * *"));
        let later = snapshot(2, Some("0 2 * * *"));
        store.put_snapshot(&soon).unwrap();
        store.put_snapshot(&later).unwrap();

        let reconciler = Reconciler::new(Arc::clone(&store), Arc::clone(&bus), ReconcilerConfig::default());
        let report = reconciler.reconcile_once(midnight()).await.unwrap();

        assert_eq!(report.candidates, 2);
        assert_eq!(report.due, 1);
        assert_eq!(report.marked, 1);
        assert_eq!(report.sent, 1);

        let stored = store.get_snapshot(&soon.snapshot_id).unwrap().unwrap();
        assert_eq!(stored.update_status, Some(UpdateStatus::UpdatePending));
        let untouched = store.get_snapshot(&later.snapshot_id).unwrap().unwrap();
        assert_eq!(untouched.update_status, None);

        let sent = bus.sent_to(routing::UPDATE_SNAPSHOT);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].payload["snapshot_id"], soon.snapshot_id.to_hex());
        assert_eq!(sent[0].payload["setup_config"]["container_name"], "gaiad");

        let second = reconciler.reconcile_once(midnight()).await.unwrap();
        assert_eq!(second.due, 0);
        assert_eq!(bus.sent_to(routing::UPDATE_SNAPSHOT).len(), 1);
    }

    #[tokio::test]
    async fn missing_network_config_fails_the_update() {
        let (_dir, store, bus) = setup();
        let mut soon = snapshot(1, Some("30 0 * * *"));
        soon.update_status = Some(UpdateStatus::UpdateFail);
        soon.update_message = Some("sync stalled".to_string());
        soon.update_detail = Some(serde_json::json!({"height": 120}));
        store.put_snapshot(&soon).unwrap();

        let reconciler = Reconciler::new(Arc::clone(&store), Arc::clone(&bus), ReconcilerConfig::default());
        let report = reconciler.reconcile_once(midnight()).await.unwrap();
        assert_eq!(report.marked, 1);
        assert_eq!(report.failed, 1);

        let stored = store.get_snapshot(&soon.snapshot_id).unwrap().unwrap();
        assert_eq!(stored.update_status, Some(UpdateStatus::UpdateFail));
        assert!(stored.update_message.unwrap().contains("cosmoshub-4"));
        assert!(stored.update_detail.is_none());
        assert!(stored.message.is_none());
        assert!(bus.sent().is_empty());

        store.put_network_config(&network()).unwrap();
        let retry = reconciler.reconcile_once(midnight()).await.unwrap();
        assert_eq!(retry.sent, 1);
    }

    #[tokio::test]
    async fn publish_failure_fails_the_update() {
        let (_dir, store, bus) = setup();
        store.put_network_config(&network()).unwrap();
        let soon = snapshot(1, Some("30 0 * * *"));
        store.put_snapshot(&soon).unwrap();
        bus.set_fail_sends(true);

        let reconciler = Reconciler::new(Arc::clone(&store), Arc::clone(&bus), ReconcilerConfig::default());
        let report = reconciler.reconcile_once(midnight()).await.unwrap();
        assert_eq!(report.failed, 1);

        let stored = store.get_snapshot(&soon.snapshot_id).unwrap().unwrap();
        assert_eq!(stored.update_status, Some(UpdateStatus::UpdateFail));
    }

    #[tokio::test]
    async fn run_stops_after_the_pass_in_flight() {
        let (_dir, store, bus) = setup();
        store.put_network_config(&network()).unwrap();
        store.put_snapshot(&snapshot(1, Some("* * * * *"))).unwrap();

        let reconciler = Reconciler::new(Arc::clone(&store), Arc::clone(&bus), ReconcilerConfig::default());
        reconciler.run(async {}).await;

        assert_eq!(bus.sent_to(routing::UPDATE_SNAPSHOT).len(), 1);
    }

    #[test]
    fn config_defaults_to_an_hour() {
        assert_eq!(ReconcilerConfig::default().period, HOUR);
    }
}
