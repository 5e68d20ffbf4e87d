use std::io;
use std::path::Path;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::warn;
use ulid::Ulid;

use crate::model::*;
use crate::observability;
use crate::wal::Wal;

use super::BookingError;

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the WAL. Appends that queue up while a flush is running are written
/// together and share one fsync.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_control(&mut wal, other);
                continue;
            }
        };

        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        commit_batch(&mut wal, &mut batch);
        if let Some(cmd) = deferred {
            handle_control(&mut wal, cmd);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let started = std::time::Instant::now();

    let mut result = Ok(());
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            result = Err(e);
            break;
        }
    }
    // Flush even after a failed append so half-written bytes do not
    // leak into the next batch.
    let flushed = wal.flush_sync();
    if result.is_ok() {
        result = flushed;
    }

    metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
        .record(started.elapsed().as_secs_f64());

    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_control(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the caller"),
    }
}

// ── Store ────────────────────────────────────────────────

struct Row {
    reservation: Reservation,
    /// A conditional status write has claimed this row and is waiting on the WAL.
    writing: bool,
}

/// Exclusive right to write one row. Released on drop.
pub(super) struct Claim<'a> {
    store: &'a ReservationStore,
    id: Ulid,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if let Some(mut row) = self.store.rows.get_mut(&self.id) {
            row.writing = false;
        }
    }
}

/// Durable reservations and their status history.
///
/// Every mutation is appended to the WAL and fsynced before it is applied in
/// memory, so readers never observe state that a crash could lose.
pub struct ReservationStore {
    rows: DashMap<Ulid, Row>,
    history: DashMap<Ulid, Vec<StatusChange>>,
    by_listing: DashMap<Ulid, Vec<Ulid>>,
    wal_tx: mpsc::Sender<WalCommand>,
    /// Writers share it; compaction takes it exclusively so the snapshot
    /// cannot miss an append that is durable but not yet applied.
    commit_gate: RwLock<()>,
}

impl ReservationStore {
    /// Replay the WAL at `path` and start the writer task. Must be called
    /// inside a tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        let replay = Wal::replay(path)?;
        if replay.truncated {
            warn!(
                path = %path.display(),
                valid_len = replay.valid_len,
                "discarding torn tail of reservation log"
            );
            Wal::discard_tail(path, replay.valid_len)?;
        }
        let wal = Wal::open(path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let store = Self {
            rows: DashMap::new(),
            history: DashMap::new(),
            by_listing: DashMap::new(),
            wal_tx,
            commit_gate: RwLock::new(()),
        };
        for event in &replay.events {
            store.apply(event);
        }
        Ok(store)
    }

    async fn wal_append(&self, event: &Event) -> Result<(), BookingError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| BookingError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| BookingError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| BookingError::WalError(e.to_string()))
    }

    fn apply(&self, event: &Event) {
        match event {
            Event::ReservationCreated { reservation } => {
                let id = reservation.id;
                self.history.insert(
                    id,
                    vec![StatusChange {
                        reservation_id: id,
                        from: None,
                        to: reservation.status,
                        at: reservation.created_at,
                        actor: Actor::Guest(reservation.requester_id.clone()),
                    }],
                );
                self.by_listing
                    .entry(reservation.listing_id)
                    .or_default()
                    .push(id);
                self.rows.insert(
                    id,
                    Row {
                        reservation: reservation.clone(),
                        writing: false,
                    },
                );
            }
            Event::StatusChanged { change } => {
                let Some(mut row) = self.rows.get_mut(&change.reservation_id) else {
                    return;
                };
                let r = &mut row.reservation;
                r.status = change.to;
                r.updated_at = change.at;
                match change.to {
                    ReservationStatus::Confirmed => r.confirmed_at = Some(change.at),
                    ReservationStatus::Cancelled => r.cancelled_at = Some(change.at),
                    _ => {}
                }
                drop(row);
                self.history
                    .entry(change.reservation_id)
                    .or_default()
                    .push(change.clone());
            }
        }
    }

    // ── Writes ───────────────────────────────────────────────

    pub async fn create(&self, reservation: Reservation) -> Result<Reservation, BookingError> {
        if self.rows.contains_key(&reservation.id) {
            return Err(BookingError::AlreadyExists(reservation.id));
        }
        let id = reservation.id;
        let _gate = self.commit_gate.read().await;
        let event = Event::ReservationCreated { reservation };
        self.wal_append(&event).await?;
        self.apply(&event);
        self.get(&id).ok_or(BookingError::ReservationNotFound(id))
    }

    /// Move `id` from `expected` to `to`. Fails with `StaleState` when the
    /// current status differs or another write holds the row.
    pub async fn update_status(
        &self,
        id: Ulid,
        expected: ReservationStatus,
        to: ReservationStatus,
        actor: Actor,
        at: DateTime<Utc>,
    ) -> Result<Reservation, BookingError> {
        let _claim = self.claim(id, expected)?;

        let _gate = self.commit_gate.read().await;
        let event = Event::StatusChanged {
            change: StatusChange {
                reservation_id: id,
                from: Some(expected),
                to,
                at,
                actor,
            },
        };
        self.wal_append(&event).await?;
        self.apply(&event);
        self.get(&id).ok_or(BookingError::ReservationNotFound(id))
    }

    /// Claim `id` for a write, provided it is still in `expected` and no
    /// other write holds it.
    pub(super) fn claim(&self, id: Ulid, expected: ReservationStatus) -> Result<Claim<'_>, BookingError> {
        let mut row = self
            .rows
            .get_mut(&id)
            .ok_or(BookingError::ReservationNotFound(id))?;
        if row.writing || row.reservation.status != expected {
            return Err(BookingError::StaleState(id));
        }
        row.writing = true;
        Ok(Claim { store: self, id })
    }

    // ── Reads ────────────────────────────────────────────────

    pub fn get(&self, id: &Ulid) -> Option<Reservation> {
        self.rows.get(id).map(|row| row.reservation.clone())
    }

    pub fn history(&self, id: &Ulid) -> Vec<StatusChange> {
        self.history
            .get(id)
            .map(|h| h.value().clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Reservations on a listing whose status is in `statuses` (all when
    /// empty), ordered by check-in.
    pub fn list_for_listing(&self, listing_id: &Ulid, statuses: &[ReservationStatus]) -> Vec<Reservation> {
        let ids = self
            .by_listing
            .get(listing_id)
            .map(|ids| ids.value().clone())
            .unwrap_or_default();
        let mut out: Vec<Reservation> = ids
            .iter()
            .filter_map(|id| self.get(id))
            .filter(|r| status_matches(r.status, statuses))
            .collect();
        out.sort_by_key(|r| (r.stay.check_in, r.id));
        out
    }

    /// A requester's reservations, newest first.
    pub fn list_for_requester(&self, requester_id: &str, statuses: &[ReservationStatus]) -> Vec<Reservation> {
        let mut out: Vec<Reservation> = self
            .rows
            .iter()
            .filter(|row| row.reservation.requester_id == requester_id)
            .filter(|row| status_matches(row.reservation.status, statuses))
            .map(|row| row.reservation.clone())
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        out
    }

    pub fn list_all(&self, statuses: &[ReservationStatus]) -> Vec<Reservation> {
        self.rows
            .iter()
            .filter(|row| status_matches(row.reservation.status, statuses))
            .map(|row| row.reservation.clone())
            .collect()
    }

    // ── Compaction ───────────────────────────────────────────

    /// Rewrite the log as one creation event per reservation followed by its
    /// recorded transitions.
    pub async fn compact(&self) -> Result<(), BookingError> {
        let _gate = self.commit_gate.write().await;

        let mut ids: Vec<Ulid> = self.rows.iter().map(|row| *row.key()).collect();
        ids.sort();

        let mut events = Vec::new();
        for id in ids {
            let Some(current) = self.get(&id) else { continue };
            let history = self.history(&id);
            let mut initial = current;
            initial.status = history
                .first()
                .map(|c| c.to)
                .unwrap_or(ReservationStatus::Pending);
            initial.updated_at = initial.created_at;
            initial.confirmed_at = None;
            initial.cancelled_at = None;
            events.push(Event::ReservationCreated { reservation: initial });
            events.extend(
                history
                    .into_iter()
                    .skip(1)
                    .map(|change| Event::StatusChanged { change }),
            );
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| BookingError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| BookingError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| BookingError::WalError(e.to_string()))
    }

    pub async fn appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

fn status_matches(status: ReservationStatus, statuses: &[ReservationStatus]) -> bool {
    statuses.is_empty() || statuses.contains(&status)
}
