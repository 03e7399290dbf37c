//! Invoice Upload Coordinator
//!
//! Writes the invoice to object storage and then reconciles the ledger:
//! - the storage write only certifies submission, processing happens out-of-band
//! - after `initial_delay_ms` the ledger is polled with exponential backoff
//! - the job settles once a polled ledger shows a voucher id that was not in
//!   the baseline, or times out after `max_attempts`
//! - without a trustworthy displayed ledger the baseline is fetched before
//!   the storage write
//! - a timed-out job can be retried; a settling job can be cancelled
//!
//! At most one job is active at a time.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::ledger_sync::LedgerSync;
use crate::adapters::{object_key, Credentials, ObjectStore};
use crate::config::UploadConfig;
use crate::domain::{Ledger, UploadFile, UploadJob, UploadStatus};
use crate::error::VoucherError;

/// Receives everything the coordinator produces while a job runs
#[async_trait]
pub trait UploadObserver: Send + Sync {
    async fn job_changed(&self, job: &UploadJob);

    /// A reconciliation poll produced a fresh ledger
    async fn ledger_refreshed(&self, ledger: Ledger);

    /// A reconciliation poll failed; the displayed ledger stays as is
    async fn ledger_refresh_failed(&self, error: &VoucherError);
}

struct Tracked {
    job: UploadJob,
    /// Voucher ids known before the write; `None` until established
    baseline: Option<HashSet<String>>,
    cancel_tx: watch::Sender<bool>,
}

pub struct UploadCoordinator {
    store: Arc<dyn ObjectStore>,
    ledger: Arc<LedgerSync>,
    config: UploadConfig,
    key_prefix: String,
    current: Mutex<Option<Tracked>>,
}

impl UploadCoordinator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        ledger: Arc<LedgerSync>,
        config: UploadConfig,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            ledger,
            config,
            key_prefix: key_prefix.into(),
            current: Mutex::new(None),
        }
    }

    /// Latest job, active or terminal
    pub fn current(&self) -> Option<UploadJob> {
        self.lock().as_ref().map(|t| t.job.clone())
    }

    pub fn has_active(&self) -> bool {
        self.lock().as_ref().map(|t| t.job.is_active()).unwrap_or(false)
    }

    /// Register a new job in `Pending`.
    ///
    /// Returns `None` (and changes nothing) when the file has no name or a job
    /// is already active. `baseline` is the set of voucher ids displayed at
    /// submission time, or `None` when the displayed ledger cannot be trusted;
    /// `run` then fetches it before writing.
    pub fn begin(
        &self,
        file: &UploadFile,
        baseline: Option<HashSet<String>>,
    ) -> Option<UploadJob> {
        if file.name.trim().is_empty() {
            debug!("Ignoring upload without a file name");
            return None;
        }

        let mut current = self.lock();
        if let Some(active) = current.as_ref().filter(|t| t.job.is_active()) {
            info!(
                job = %active.job.id,
                status = active.job.status.label(),
                "Upload already in progress; ignoring {}",
                file.name
            );
            return None;
        }

        let job = UploadJob::new(file, object_key(&self.key_prefix, &file.name));
        let (cancel_tx, _) = watch::channel(false);
        *current = Some(Tracked {
            job: job.clone(),
            baseline,
            cancel_tx,
        });
        info!(job = %job.id, key = %job.key, "Upload job created");
        Some(job)
    }

    /// Drive a job created by `begin` through the storage write and reconciliation
    pub async fn run(
        &self,
        credentials: &Credentials,
        file: UploadFile,
        observer: &dyn UploadObserver,
    ) -> UploadStatus {
        let Some((key, mut cancel_rx)) = self
            .lock()
            .as_ref()
            .filter(|t| matches!(t.job.status, UploadStatus::Pending))
            .map(|t| (t.job.key.clone(), t.cancel_tx.subscribe()))
        else {
            // Cancelled before the task got to run
            if let Some(UploadStatus::Cancelled) = self.current().map(|job| job.status) {
                return UploadStatus::Cancelled;
            }
            warn!("No pending upload job to run");
            return UploadStatus::Failed {
                reason: "no pending upload job".to_string(),
            };
        };

        if !self.advance(UploadStatus::Uploading, observer).await {
            return self.status_or_cancelled();
        }

        let needs_baseline = self
            .lock()
            .as_ref()
            .map(|t| t.baseline.is_none())
            .unwrap_or(false);
        if needs_baseline {
            let fetched = tokio::select! {
                result = self.ledger.refresh(credentials) => result,
                _ = wait_cancelled(&mut cancel_rx) => return self.status_or_cancelled(),
            };
            match fetched {
                Ok(ledger) => {
                    let ids: HashSet<String> = ledger.voucher_ids().map(str::to_string).collect();
                    debug!(%key, vouchers = ids.len(), "Reconciliation baseline fetched");
                    if let Some(t) = self.lock().as_mut() {
                        t.baseline = Some(ids);
                    }
                    observer.ledger_refreshed(ledger).await;
                }
                Err(e) => {
                    warn!(%key, "Cannot establish ledger baseline; not uploading: {}", e);
                    observer.ledger_refresh_failed(&e).await;
                    let status = UploadStatus::Failed {
                        reason: format!("ledger unavailable before upload: {e}"),
                    };
                    self.advance(status.clone(), observer).await;
                    return status;
                }
            }
        }

        let write = self
            .store
            .put_object(credentials, &key, &file.content_type, file.data);
        let result = tokio::select! {
            result = write => result,
            _ = wait_cancelled(&mut cancel_rx) => return self.status_or_cancelled(),
        };

        if let Err(e) = result {
            warn!(%key, kind = %e.kind(), "Upload failed: {}", e);
            let status = UploadStatus::Failed {
                reason: e.to_string(),
            };
            self.advance(status.clone(), observer).await;
            return status;
        }

        info!(%key, "Upload accepted; processing invoice");
        if !self.advance(UploadStatus::Settling { attempt: 0 }, observer).await {
            return self.status_or_cancelled();
        }
        self.reconcile(credentials, cancel_rx, observer).await
    }

    /// Restart reconciliation for a timed-out job with a fresh attempt budget.
    ///
    /// Returns `None` when there is nothing to retry.
    pub async fn retry(
        &self,
        credentials: &Credentials,
        observer: &dyn UploadObserver,
    ) -> Option<UploadStatus> {
        let cancel_rx = {
            let mut current = self.lock();
            let tracked = current.as_mut().filter(|t| t.job.status.is_retryable())?;
            let (cancel_tx, cancel_rx) = watch::channel(false);
            tracked.cancel_tx = cancel_tx;
            tracked.job.transition(UploadStatus::Settling { attempt: 0 });
            info!(job = %tracked.job.id, "Retrying reconciliation");
            cancel_rx
        };

        if let Some(job) = self.current() {
            observer.job_changed(&job).await;
        }
        Some(self.reconcile(credentials, cancel_rx, observer).await)
    }

    /// Cancel the active job. Returns the cancelled job, if any.
    pub fn cancel(&self) -> Option<UploadJob> {
        let mut current = self.lock();
        let tracked = current.as_mut().filter(|t| t.job.is_active())?;
        tracked.job.transition(UploadStatus::Cancelled);
        let _ = tracked.cancel_tx.send(true);
        info!(job = %tracked.job.id, "Upload cancelled");
        Some(tracked.job.clone())
    }

    async fn reconcile(
        &self,
        credentials: &Credentials,
        mut cancel_rx: watch::Receiver<bool>,
        observer: &dyn UploadObserver,
    ) -> UploadStatus {
        let baseline = self
            .lock()
            .as_ref()
            .and_then(|t| t.baseline.clone())
            .unwrap_or_default();

        for attempt in 1..=self.config.max_attempts {
            let delay = self.config.poll_delay(attempt);
            debug!(attempt, delay_ms = delay.as_millis() as u64, "Waiting before ledger poll");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = wait_cancelled(&mut cancel_rx) => return self.status_or_cancelled(),
            }

            if !self.advance(UploadStatus::Settling { attempt }, observer).await {
                return self.status_or_cancelled();
            }

            match self.ledger.refresh(credentials).await {
                Ok(ledger) => {
                    let new_ids: Vec<String> = ledger
                        .voucher_ids()
                        .filter(|id| !baseline.contains(*id))
                        .map(str::to_string)
                        .collect();
                    observer.ledger_refreshed(ledger).await;

                    if !new_ids.is_empty() {
                        info!(attempt, vouchers = ?new_ids, "Upload settled");
                        let status = UploadStatus::Settled {
                            voucher_ids: new_ids,
                        };
                        if !self.advance(status.clone(), observer).await {
                            return self.status_or_cancelled();
                        }
                        return status;
                    }
                    debug!(attempt, "Ledger not yet reconciled");
                }
                Err(e) => {
                    warn!(attempt, "Reconciliation poll failed: {}", e);
                    observer.ledger_refresh_failed(&e).await;
                }
            }
        }

        let status = UploadStatus::TimedOut {
            attempts: self.config.max_attempts,
        };
        warn!(attempts = self.config.max_attempts, "Upload reconciliation timed out");
        if !self.advance(status.clone(), observer).await {
            return self.status_or_cancelled();
        }
        status
    }

    /// Move the tracked job to `status` unless it was cancelled meanwhile.
    /// Returns false when the job is no longer active.
    async fn advance(&self, status: UploadStatus, observer: &dyn UploadObserver) -> bool {
        let job = {
            let mut current = self.lock();
            match current.as_mut() {
                Some(t) if t.job.is_active() => {
                    t.job.transition(status);
                    t.job.clone()
                }
                _ => return false,
            }
        };
        debug!(job = %job.id, status = %job.status, "Upload status changed");
        observer.job_changed(&job).await;
        true
    }

    fn status_or_cancelled(&self) -> UploadStatus {
        self.lock()
            .as_ref()
            .map(|t| t.job.status.clone())
            .unwrap_or(UploadStatus::Cancelled)
    }

    fn lock(&self) -> MutexGuard<'_, Option<Tracked>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Resolves once the cancel flag is raised; never resolves if the sender is gone
async fn wait_cancelled(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
