mod admission;
mod error;
mod queries;
mod store;
mod transitions;

pub use error::BookingError;
pub use store::ReservationStore;
pub use transitions::SweepReport;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::warn;
use ulid::Ulid;

use crate::calendar::CalendarIndex;
use crate::config::EngineConfig;
use crate::directory::ListingDirectory;
use crate::model::*;
use crate::notify::{NotificationKind, NotificationSink};
use crate::observability;

pub type SharedCalendar = Arc<RwLock<CalendarIndex>>;

/// Admission control and lifecycle for every listing in the process.
///
/// Each listing calendar sits behind its own lock; the store is shared.
/// Anything that adds or removes a calendar interval holds that listing's
/// write lock across the store write and the index update.
pub struct Engine {
    calendars: DashMap<Ulid, SharedCalendar>,
    store: Arc<ReservationStore>,
    directory: Arc<dyn ListingDirectory>,
    notify: Arc<dyn NotificationSink>,
    config: EngineConfig,
}

impl Engine {
    /// Replay the reservation log at `wal_path`. Must be called inside a
    /// tokio runtime.
    pub fn new(
        wal_path: PathBuf,
        directory: Arc<dyn ListingDirectory>,
        notify: Arc<dyn NotificationSink>,
        config: EngineConfig,
    ) -> io::Result<Self> {
        let store = ReservationStore::open(&wal_path)?;
        Ok(Self {
            calendars: DashMap::new(),
            store: Arc::new(store),
            directory,
            notify,
            config,
        })
    }

    pub fn store(&self) -> &ReservationStore {
        &self.store
    }

    /// The listing's calendar, rebuilt from the store on first use.
    pub fn calendar(&self, listing_id: Ulid) -> SharedCalendar {
        if let Some(cal) = self.calendars.get(&listing_id) {
            return cal.value().clone();
        }
        self.calendars
            .entry(listing_id)
            .or_insert_with(|| {
                let holding = self.store.list_for_listing(&listing_id, &HOLDING_STATUSES);
                metrics::gauge!(observability::CALENDARS_ACTIVE).increment(1.0);
                Arc::new(RwLock::new(CalendarIndex::from_reservations(listing_id, &holding)))
            })
            .value()
            .clone()
    }

    /// Exclusive access to a listing calendar, or `AdmissionTimeout`.
    pub(super) async fn lock_calendar(
        &self,
        listing_id: Ulid,
    ) -> Result<OwnedRwLockWriteGuard<CalendarIndex>, BookingError> {
        let cal = self.calendar(listing_id);
        tokio::time::timeout(self.config.admission_timeout, cal.write_owned())
            .await
            .map_err(|_| {
                warn!(listing = %listing_id, "calendar lock wait timed out");
                BookingError::AdmissionTimeout(listing_id)
            })
    }

    pub(super) async fn read_calendar(
        &self,
        listing_id: Ulid,
    ) -> Result<OwnedRwLockReadGuard<CalendarIndex>, BookingError> {
        let cal = self.calendar(listing_id);
        tokio::time::timeout(self.config.admission_timeout, cal.read_owned())
            .await
            .map_err(|_| BookingError::AdmissionTimeout(listing_id))
    }

}

/// Hand an event to the sink. Delivery failures never reach the caller.
fn announce(sink: &dyn NotificationSink, kind: NotificationKind, reservation: &Reservation) {
    if let Err(e) = sink.notify(kind, reservation) {
        warn!(reservation = %reservation.id, ?kind, "notification failed: {e}");
    }
}
