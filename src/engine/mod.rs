mod branch;
mod error;
mod mutations;
mod queries;

pub use branch::BranchState;
pub use error::EngineError;
pub use mutations::{BookingOutcome, BookingRequest, TableUpdate};

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::model::*;
use crate::notify::NotifyHub;
use crate::ports::EventSink;
use crate::wal::Wal;

pub type SharedBranchState = Arc<RwLock<BranchState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        record: Record,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        records: Vec<Record>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Record, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit:
/// take the first append, drain whatever else is already queued, then one
/// fsync for the whole batch.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (record, response) = match cmd {
            WalCommand::Append { record, response } => (record, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut batch = vec![(record, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { record, response }) => batch.push((record, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        respond_batch(batch, &result);

        // Non-append commands queued behind the batch run after it is durable.
        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let append_result = batch
        .iter()
        .try_for_each(|(record, _)| wal.append_buffered(record));
    // Flush even after a failed append so half-written bytes don't leak into
    // the next batch; the whole batch is reported as failed.
    let flush_result = wal.flush_sync();
    append_result.and(flush_result)
}

fn respond_batch(batch: Vec<PendingAppend>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { records, response } => {
            let result = Wal::write_compact_file(wal.path(), &records)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// One tenant's branches, tables and reservations.
///
/// Each mutation takes the branch write lock, then validates, appends to the
/// WAL, applies and publishes while still holding it. Two bookings for the
/// same branch therefore never see the same free table, which closes the
/// check-then-act gap between reading reservations and writing a new one.
pub struct Engine {
    pub tenant_id: TenantId,
    pub(super) branches: DashMap<BranchId, SharedBranchState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    /// Reverse lookup: reservation id → branch id.
    pub(super) reservation_to_branch: DashMap<ReservationId, BranchId>,
    /// Mutations hold this shared; compaction holds it exclusively so its
    /// snapshot cannot miss an acknowledged write.
    pub(super) write_gate: RwLock<()>,
}

impl Engine {
    /// Replay the tenant's WAL and start its group-commit writer.
    /// Must be called inside a Tokio runtime.
    pub fn new(tenant_id: TenantId, wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let records = Wal::recover(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            tenant_id,
            branches: DashMap::new(),
            wal_tx,
            notify,
            reservation_to_branch: DashMap::new(),
            write_gate: RwLock::new(()),
        };

        // Replay into plain states first; they are shared only once complete.
        let mut states: HashMap<BranchId, BranchState> = HashMap::new();
        for record in &records {
            if let Record::BranchCreated { id, name } = record {
                if states.contains_key(id) {
                    warn!("replay: branch {id} created twice, keeping the first");
                    continue;
                }
                states.insert(*id, BranchState::new(*id, name.clone()));
                continue;
            }
            let Some(state) = states.get_mut(&record.branch_id()) else {
                debug!("replay: record for unknown branch {}", record.branch_id());
                continue;
            };
            engine.apply(state, record);
        }
        for (id, state) in states {
            engine.branches.insert(id, Arc::new(RwLock::new(state)));
        }

        info!(
            "tenant {tenant_id}: replayed {} records into {} branches",
            records.len(),
            engine.branches.len()
        );
        Ok(engine)
    }

    /// Write a record via the background group-commit writer.
    pub(super) async fn wal_append(&self, record: &Record) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                record: record.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_branch(&self, id: &BranchId) -> Option<SharedBranchState> {
        self.branches.get(id).map(|e| e.value().clone())
    }

    pub(super) fn require_branch(&self, id: &BranchId) -> Result<SharedBranchState, EngineError> {
        self.get_branch(id).ok_or(EngineError::BranchNotFound(*id))
    }

    pub fn branch_for_reservation(&self, id: &ReservationId) -> Option<BranchId> {
        self.reservation_to_branch.get(id).map(|e| *e.value())
    }

    fn apply(&self, state: &mut BranchState, record: &Record) {
        state.apply(record);
        if let Record::ReservationSaved { reservation } = record {
            self.reservation_to_branch
                .insert(reservation.id(), reservation.branch_id());
        }
    }

    /// WAL-append, apply, then publish the events the change raised.
    pub(super) async fn persist_and_apply(
        &self,
        state: &mut BranchState,
        record: &Record,
        events: &[ReservationEvent],
    ) -> Result<(), EngineError> {
        self.wal_append(record).await?;
        self.apply(state, record);
        for event in events {
            metrics::counter!(crate::observability::TRANSITIONS_TOTAL, "event" => event.name())
                .increment(1);
            self.notify.publish(event);
        }
        Ok(())
    }

    pub async fn appends_since_compact(&self) -> Result<u64, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))
    }

    /// Rewrite the WAL as the minimal record set for the current state.
    /// Returns the number of records written.
    pub async fn compact(&self) -> Result<usize, EngineError> {
        let _gate = self.write_gate.write().await;

        let shared: Vec<SharedBranchState> =
            self.branches.iter().map(|e| e.value().clone()).collect();
        let mut records = Vec::new();
        for state in shared {
            records.extend(state.read().await.snapshot());
        }
        let count = records.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                records,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;

        info!("tenant {}: compacted WAL to {count} records", self.tenant_id);
        Ok(count)
    }
}
