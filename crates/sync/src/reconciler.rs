//! Sync Reconciler: a recurring background task that drains the
//! Change-Capture Log and pushes the affected entities back to the primary
//! store. Each cycle polls unattempted entries, collapses them so only the
//! most recent record per entity survives, issues deletes before upserts
//! (a delete always supersedes a queued update for the same key), then
//! confirms completions -- removing entries the store acknowledged and
//! leaving everything else for the next cycle.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use tsmeta_catalog::CatalogDb;
use tsmeta_core::{CatalogEntity, ChangeOp, ChangeRecord, EntityRef};

use crate::error::SyncError;
use crate::store::{Completion, TsdbStore};

/// Values-only configuration for the reconciliation loop.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Delay between the end of one poll cycle and the start of the next.
    pub poll_interval: Duration,
    /// Delay before the first poll cycle after start.
    pub initial_delay: Duration,
    /// How long a cycle waits on outstanding store completions before
    /// leaving them for the next cycle.
    pub drain_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(5000),
            initial_delay: Duration::from_millis(1000),
            drain_timeout: Duration::from_millis(2000),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CycleStats {
    pub polled: usize,
    pub deletes_issued: usize,
    pub upserts_issued: usize,
    /// Non-delete entries discarded because a delete for the same key
    /// superseded them; their queue rows are removed without ever reaching
    /// the store.
    pub purged: usize,
    /// Entries removed after the store confirmed the operation.
    pub confirmed: usize,
    /// Entries stamped with an attempt time and error.
    pub faulted: usize,
    /// Entries left untouched for the next cycle: reported failures and
    /// still-outstanding completions.
    pub deferred: usize,
}

#[derive(Debug)]
pub enum CycleOutcome {
    Completed(CycleStats),
    /// Another cycle was still in flight; this one did not run.
    Skipped,
}

struct Inflight {
    qid: i64,
    completion: Completion,
}

pub struct Reconciler {
    db: CatalogDb,
    store: Arc<dyn TsdbStore>,
    config: SyncConfig,
    in_progress: AtomicBool,
}

impl Reconciler {
    pub fn new(db: CatalogDb, store: Arc<dyn TsdbStore>, config: SyncConfig) -> Self {
        Self {
            db,
            store,
            config,
            in_progress: AtomicBool::new(false),
        }
    }

    pub fn db(&self) -> &CatalogDb {
        &self.db
    }

    /// Runs one poll cycle. Skips entirely when a previous cycle is still
    /// marked in flight.
    pub fn run_cycle(&self) -> Result<CycleOutcome, SyncError> {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("sync already in progress, skipping cycle");
            return Ok(CycleOutcome::Skipped);
        }
        let result = self.cycle_inner();
        self.in_progress.store(false, Ordering::Release);
        result.map(CycleOutcome::Completed)
    }

    fn cycle_inner(&self) -> Result<CycleStats, SyncError> {
        let mut stats = CycleStats::default();

        // Poll: every record nobody has attempted yet, deletes first,
        // oldest first within an op type.
        let records = self.db.poll_sync_queue()?;
        stats.polled = records.len();
        debug!(rows = stats.polled, "retrieved sync queue rows");

        // Merge: one map per class keyed by entity identity. Rows arrive in
        // ascending order and a map put overwrites, so only the most recent
        // record per key survives.
        let mut deletes: BTreeMap<(&'static str, String), ChangeRecord> = BTreeMap::new();
        let mut upserts: BTreeMap<(&'static str, String), ChangeRecord> = BTreeMap::new();
        for record in records {
            let key = (record.entity.table(), record.entity.key());
            match record.op {
                ChangeOp::Delete => deletes.insert(key, record),
                _ => upserts.insert(key, record),
            };
        }

        let mut inflight = Vec::new();

        // Deletes first. Whatever the store ends up reporting, any pending
        // non-delete for the same key is obsolete and is purged directly.
        for (key, record) in deletes {
            if let Some(superseded) = upserts.remove(&key) {
                self.db.delete_sync_entry(superseded.qid)?;
                info!(qid = superseded.qid, "purged sync entry superseded by delete");
                stats.purged += 1;
            }
            let tombstone = record.entity.tombstone();
            debug!(table = record.entity.table(), key = %record.entity.key(), "issuing store delete");
            inflight.push(Inflight {
                qid: record.qid,
                completion: self.store.delete(tombstone),
            });
            stats.deletes_issued += 1;
        }

        // Surviving non-deletes: re-read the current row by natural key and
        // push the decoded entity. A record that cannot be read or decoded
        // is stamped and never polled again; it must not abort the cycle.
        for (_key, record) in upserts {
            match self.load_entity(&record.entity) {
                Ok(Some(entity)) => {
                    debug!(table = record.entity.table(), key = %record.entity.key(), "issuing store upsert");
                    inflight.push(Inflight {
                        qid: record.qid,
                        completion: self.store.upsert(entity),
                    });
                    stats.upserts_issued += 1;
                }
                Ok(None) => {
                    warn!(qid = record.qid, key = %record.entity.key(), "catalog row missing at sync time");
                    self.db
                        .mark_sync_attempt(record.qid, "catalog row missing at sync time")?;
                    stats.faulted += 1;
                }
                Err(e) => {
                    error!(qid = record.qid, %e, "failed to reconstruct entity for sync");
                    self.db.mark_sync_attempt(record.qid, &e.to_string())?;
                    stats.faulted += 1;
                }
            }
        }

        // Confirm completions. Success removes the queue entry; a reported
        // failure leaves it untouched so the next poll retries it with no
        // backoff; a fault stamps the attempt and error; anything still
        // outstanding is likewise left for the next cycle.
        for op in inflight {
            match op.completion.wait_timeout(self.config.drain_timeout) {
                Some(Ok(true)) => {
                    self.db.delete_sync_entry(op.qid)?;
                    stats.confirmed += 1;
                }
                Some(Ok(false)) => {
                    debug!(qid = op.qid, "store reported failure, retrying next cycle");
                    stats.deferred += 1;
                }
                Some(Err(fault)) => {
                    warn!(qid = op.qid, %fault, "store fault");
                    self.db.mark_sync_attempt(op.qid, &fault.to_string())?;
                    stats.faulted += 1;
                }
                None => {
                    debug!(qid = op.qid, "store completion still outstanding");
                    stats.deferred += 1;
                }
            }
        }

        info!(
            deletes = stats.deletes_issued,
            upserts = stats.upserts_issued,
            confirmed = stats.confirmed,
            purged = stats.purged,
            deferred = stats.deferred,
            faulted = stats.faulted,
            "sync cycle complete"
        );
        Ok(stats)
    }

    fn load_entity(&self, entity: &EntityRef) -> Result<Option<CatalogEntity>, SyncError> {
        match entity {
            EntityRef::Uid { kind, uid } => {
                Ok(self.db.uid_entity(*kind, *uid)?.map(CatalogEntity::Uid))
            }
            EntityRef::Series { tsuid } => {
                Ok(self.db.time_series(tsuid)?.map(CatalogEntity::Series))
            }
            EntityRef::Annotation { key } => {
                Ok(self.db.annotation(key)?.map(CatalogEntity::Annotation))
            }
        }
    }

    /// Moves the reconciler onto its dedicated scheduling thread: first
    /// cycle after `initial_delay`, then a fixed `poll_interval` between
    /// cycles. A failed cycle is logged and retried next period.
    pub fn start(self) -> Result<ReconcilerHandle, SyncError> {
        let (stop_tx, stop_rx) = mpsc::channel();
        let join = std::thread::Builder::new()
            .name("sync-reconciler".into())
            .spawn(move || {
                let mut delay = self.config.initial_delay;
                loop {
                    match stop_rx.recv_timeout(delay) {
                        Err(RecvTimeoutError::Timeout) => {
                            if let Err(error) = self.run_cycle() {
                                warn!(%error, "sync poll cycle failed");
                            }
                            delay = self.config.poll_interval;
                        }
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                info!("sync reconciler stopped");
            })?;
        Ok(ReconcilerHandle {
            stop_tx,
            join: Some(join),
        })
    }
}

/// Handle to a running reconciler thread. Stopping cancels the schedule but
/// not completions already in flight at the store.
pub struct ReconcilerHandle {
    stop_tx: Sender<()>,
    join: Option<JoinHandle<()>>,
}

impl ReconcilerHandle {
    pub fn stop(mut self) {
        let _ = self.stop_tx.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}
