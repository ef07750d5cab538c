mod writer;

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::{debug, info};

use crate::engine::EngineError;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::ports::{CancelOutcome, ReservationRepository, StoreError};
use crate::wal::Wal;

use writer::{wal_writer_loop, WalCommand};

pub type SharedLedger = Arc<RwLock<CourtLedger>>;

/// Every reservation ever placed on one court, sorted by start.
/// Cancelled entries stay in place as history.
#[derive(Debug, Default)]
pub struct CourtLedger {
    reservations: Vec<Reservation>,
}

impl CourtLedger {
    pub fn len(&self) -> usize {
        self.reservations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reservations.is_empty()
    }

    fn insert(&mut self, reservation: Reservation) {
        let pos = self.reservations.partition_point(|r| r.start <= reservation.start);
        self.reservations.insert(pos, reservation);
    }

    /// Entries whose span overlaps `range`, in start order.
    pub fn overlapping(&self, range: &Span) -> impl Iterator<Item = &Reservation> {
        let right_bound = self.reservations.partition_point(|r| r.start < range.end);
        let range = *range;
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.span().end > range.start)
    }

    pub fn first_active_overlap(&self, span: &Span) -> Option<ReservationId> {
        self.overlapping(span).find(|r| r.is_active()).map(|r| r.id)
    }

    pub fn get(&self, id: ReservationId) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    fn get_mut(&mut self, id: ReservationId) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reservation> {
        self.reservations.iter()
    }
}

type CourtIndex = DashMap<ReservationId, CourtId>;

fn apply_to_ledger(ledger: &mut CourtLedger, event: &Event, index: &CourtIndex) {
    match event {
        Event::ReservationPlaced { reservation } => {
            index.insert(reservation.id, reservation.court_id);
            ledger.insert(reservation.clone());
        }
        Event::ReservationCancelled { id, .. } => {
            if let Some(r) = ledger.get_mut(*id) {
                r.status = ReservationStatus::Cancelled;
            }
        }
    }
}

async fn wal_append(wal_tx: &mpsc::Sender<WalCommand>, event: &Event) -> Result<(), StoreError> {
    let (tx, rx) = oneshot::channel();
    wal_tx
        .send(WalCommand::Append {
            event: event.clone(),
            response: tx,
        })
        .await
        .map_err(|_| StoreError::Unavailable("WAL writer shut down".into()))?;
    rx.await
        .map_err(|_| StoreError::Unavailable("WAL writer dropped response".into()))?
        .map_err(|e| StoreError::Unavailable(format!("WAL append failed: {e}")))
}

/// In-process reservation store: one lock per court, optionally journaled
/// to a write-ahead log.
pub struct LedgerStore {
    courts: DashMap<CourtId, SharedLedger>,
    /// Reverse lookup: reservation id → court id.
    reservation_court: Arc<CourtIndex>,
    wal_tx: Option<mpsc::Sender<WalCommand>>,
    /// Mutations hold it shared; compaction holds it exclusively so no append
    /// is in flight while the log is rewritten. Always taken before a ledger lock.
    commit_gate: Arc<RwLock<()>>,
    pub notify: Arc<NotifyHub>,
}

impl LedgerStore {
    /// Volatile store: nothing survives the process.
    pub fn in_memory(notify: Arc<NotifyHub>) -> Self {
        Self {
            courts: DashMap::new(),
            reservation_court: Arc::new(DashMap::new()),
            wal_tx: None,
            commit_gate: Arc::new(RwLock::new(())),
            notify,
        }
    }

    /// Replay `wal_path` and keep journaling to it. Must run inside a tokio runtime.
    pub fn open(wal_path: &Path, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Wal::replay(wal_path)?;
        let wal = Wal::open(wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let reservation_court = DashMap::new();
        let mut ledgers: HashMap<CourtId, CourtLedger> = HashMap::new();
        for event in &events {
            let ledger = ledgers.entry(event.court_id()).or_default();
            apply_to_ledger(ledger, event, &reservation_court);
        }
        info!(
            "replayed {} events for {} courts from {}",
            events.len(),
            ledgers.len(),
            wal_path.display()
        );

        let courts = ledgers
            .into_iter()
            .map(|(id, ledger)| (id, Arc::new(RwLock::new(ledger))))
            .collect();

        Ok(Self {
            courts,
            reservation_court: Arc::new(reservation_court),
            wal_tx: Some(wal_tx),
            commit_gate: Arc::new(RwLock::new(())),
            notify,
        })
    }

    pub fn is_durable(&self) -> bool {
        self.wal_tx.is_some()
    }

    /// Reservations ever placed, cancelled ones included.
    pub fn len(&self) -> usize {
        self.reservation_court.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reservation_court.is_empty()
    }

    fn ledger(&self, court_id: CourtId) -> SharedLedger {
        self.courts.entry(court_id).or_default().value().clone()
    }

    fn existing_ledger(&self, court_id: &CourtId) -> Option<SharedLedger> {
        self.courts.get(court_id).map(|e| e.value().clone())
    }

    /// Journal, apply, then announce, on a task of its own that owns both
    /// locks. Once started the commit runs to the end even if the caller is
    /// dropped, so the ledger never lags behind the log.
    async fn commit(
        &self,
        gate: OwnedRwLockReadGuard<()>,
        mut ledger: OwnedRwLockWriteGuard<CourtLedger>,
        event: Event,
    ) -> Result<(), StoreError> {
        let wal_tx = self.wal_tx.clone();
        let index = self.reservation_court.clone();
        let notify = self.notify.clone();
        let task = tokio::spawn(async move {
            let _gate = gate;
            if let Some(wal_tx) = wal_tx {
                wal_append(&wal_tx, &event).await?;
            }
            apply_to_ledger(&mut ledger, &event, &index);
            notify.send(event.court_id(), &event);
            Ok::<(), StoreError>(())
        });
        task.await
            .map_err(|e| StoreError::Unavailable(format!("commit task failed: {e}")))?
    }

    /// Rewrite the log as one `ReservationPlaced` per reservation carrying its
    /// current status. No-op for an in-memory store.
    pub async fn compact(&self) -> Result<(), EngineError> {
        let Some(wal_tx) = &self.wal_tx else {
            return Ok(());
        };
        let _gate = self.commit_gate.write().await;

        let ledgers: Vec<SharedLedger> = self.courts.iter().map(|e| e.value().clone()).collect();
        let mut events = Vec::with_capacity(self.reservation_court.len());
        for ledger in ledgers {
            let guard = ledger.read().await;
            events.extend(guard.iter().map(|r| Event::ReservationPlaced {
                reservation: r.clone(),
            }));
        }
        let count = events.len();

        let (tx, rx) = oneshot::channel();
        wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        debug!("compacted WAL to {count} events");
        Ok(())
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let Some(wal_tx) = &self.wal_tx else {
            return 0;
        };
        let (tx, rx) = oneshot::channel();
        if wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl ReservationRepository for LedgerStore {
    async fn list_reservations(&self, court_id: CourtId, range: Span) -> Result<Vec<Reservation>, StoreError> {
        let Some(ledger) = self.existing_ledger(&court_id) else {
            return Ok(Vec::new());
        };
        let guard = ledger.read().await;
        Ok(guard.overlapping(&range).cloned().collect())
    }

    async fn insert_reservation_if_free(&self, reservation: Reservation) -> Result<Reservation, StoreError> {
        let gate = self.commit_gate.clone().read_owned().await;
        if self.reservation_court.contains_key(&reservation.id) {
            return Err(StoreError::Conflict(reservation.id));
        }
        let guard = self.ledger(reservation.court_id).write_owned().await;

        if reservation.is_active()
            && let Some(existing) = guard.first_active_overlap(&reservation.span())
        {
            return Err(StoreError::Conflict(existing));
        }

        let event = Event::ReservationPlaced {
            reservation: reservation.clone(),
        };
        self.commit(gate, guard, event).await?;
        Ok(reservation)
    }

    async fn cancel_reservation(&self, id: ReservationId) -> Result<CancelOutcome, StoreError> {
        let gate = self.commit_gate.clone().read_owned().await;
        let Some(court_id) = self.reservation_court.get(&id).map(|e| *e.value()) else {
            return Ok(CancelOutcome::NotFound);
        };
        let Some(ledger) = self.existing_ledger(&court_id) else {
            return Ok(CancelOutcome::NotFound);
        };
        let guard = ledger.write_owned().await;

        let status = guard.get(id).map(|r| r.status);
        match status {
            None => Ok(CancelOutcome::NotFound),
            Some(ReservationStatus::Cancelled) => Ok(CancelOutcome::AlreadyCancelled),
            Some(_) => {
                self.commit(gate, guard, Event::ReservationCancelled { id, court_id })
                    .await?;
                Ok(CancelOutcome::Cancelled)
            }
        }
    }

    async fn get_reservation(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        let Some(court_id) = self.reservation_court.get(&id).map(|e| *e.value()) else {
            return Ok(None);
        };
        let Some(ledger) = self.existing_ledger(&court_id) else {
            return Ok(None);
        };
        let guard = ledger.read().await;
        Ok(guard.get(id).cloned())
    }
}
