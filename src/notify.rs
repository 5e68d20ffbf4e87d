use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::{Reservation, ReservationStatus};

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Created,
    Confirmed,
    Activated,
    Completed,
    Cancelled,
}

impl NotificationKind {
    /// The event announcing arrival in `status`.
    pub fn for_status(status: ReservationStatus) -> Self {
        match status {
            ReservationStatus::Pending => NotificationKind::Created,
            ReservationStatus::Confirmed => NotificationKind::Confirmed,
            ReservationStatus::Active => NotificationKind::Activated,
            ReservationStatus::Completed => NotificationKind::Completed,
            ReservationStatus::Cancelled => NotificationKind::Cancelled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub reservation: Reservation,
}

#[derive(Error, Debug)]
#[error("notification not delivered: {0}")]
pub struct NotifyError(pub String);

/// Out-of-band receiver of reservation events. Called after a transition is
/// durable; an error is logged and otherwise ignored.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, kind: NotificationKind, reservation: &Reservation) -> Result<(), NotifyError>;
}

/// Broadcast hub with one channel per listing.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Notification>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a listing's events, creating its channel on first use.
    pub fn subscribe(&self, listing_id: Ulid) -> broadcast::Receiver<Notification> {
        self.channels
            .entry(listing_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }
}

impl NotificationSink for NotifyHub {
    /// No-op when nobody is listening.
    fn notify(&self, kind: NotificationKind, reservation: &Reservation) -> Result<(), NotifyError> {
        if let Some(sender) = self.channels.get(&reservation.listing_id) {
            let _ = sender.send(Notification {
                kind,
                reservation: reservation.clone(),
            });
        }
        Ok(())
    }
}
