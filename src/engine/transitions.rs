use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info};
use ulid::Ulid;

use crate::lifecycle;
use crate::model::*;
use crate::notify::NotificationKind;
use crate::observability;

use super::{BookingError, Engine, announce};

/// Base pause before re-reading a reservation another writer holds; grows
/// with each attempt.
const STALE_RETRY_BACKOFF: Duration = Duration::from_millis(5);

/// What one sweep changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub activated: usize,
    pub completed: usize,
    pub expired: usize,
}

impl Engine {
    /// Host (or other caller) accepts a pending reservation.
    pub async fn confirm(&self, id: Ulid, actor: Actor) -> Result<Reservation, BookingError> {
        self.transition(id, ReservationStatus::Confirmed, actor).await
    }

    pub async fn cancel(&self, id: Ulid, actor: Actor) -> Result<Reservation, BookingError> {
        self.transition(id, ReservationStatus::Cancelled, actor).await
    }

    /// Payment collaborator callback. Success confirms, failure cancels.
    /// Only a pending reservation is settled by payment; a late callback for
    /// one that has already moved on is an `InvalidTransition`.
    pub async fn on_payment_result(
        &self,
        id: Ulid,
        outcome: PaymentOutcome,
    ) -> Result<Reservation, BookingError> {
        let to = match outcome {
            PaymentOutcome::Succeeded => ReservationStatus::Confirmed,
            PaymentOutcome::Failed => ReservationStatus::Cancelled,
        };
        self.transition_from(id, Some(ReservationStatus::Pending), to, Actor::Payment)
            .await
    }

    /// Advance a reservation along the date-driven edges. `Ok(None)` when it
    /// is already where `today` puts it.
    pub async fn apply_derived(
        &self,
        id: Ulid,
        today: NaiveDate,
    ) -> Result<Option<Reservation>, BookingError> {
        let current = self
            .store
            .get(&id)
            .ok_or(BookingError::ReservationNotFound(id))?;
        match lifecycle::derived_status(current.status, &current.stay, today) {
            Some(to) => self.transition(id, to, Actor::System).await.map(Some),
            None => Ok(None),
        }
    }

    /// Apply every derived transition due on `today` and cancel pending
    /// reservations older than the configured TTL at `now`.
    pub async fn sweep(&self, today: NaiveDate, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        let ttl = self
            .config
            .pending_ttl
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok());

        for r in self.store.list_all(&HOLDING_STATUSES) {
            if r.status == ReservationStatus::Pending {
                let Some(ttl) = ttl else { continue };
                if now - r.created_at < ttl {
                    continue;
                }
                match self.cancel(r.id, Actor::System).await {
                    Ok(_) => {
                        report.expired += 1;
                        metrics::counter!(observability::PENDING_EXPIRED_TOTAL).increment(1);
                        info!(reservation = %r.id, "pending reservation expired");
                    }
                    Err(e) => debug!(reservation = %r.id, "expiry skipped: {e}"),
                }
                continue;
            }

            match self.apply_derived(r.id, today).await {
                Ok(Some(updated)) if updated.status == ReservationStatus::Active => report.activated += 1,
                Ok(Some(_)) => report.completed += 1,
                Ok(None) => {}
                Err(e) => debug!(reservation = %r.id, "derived transition skipped: {e}"),
            }
        }
        report
    }

    /// Move `id` to `to`, re-reading and retrying when a concurrent writer
    /// got there first.
    pub async fn transition(
        &self,
        id: Ulid,
        to: ReservationStatus,
        actor: Actor,
    ) -> Result<Reservation, BookingError> {
        self.transition_from(id, None, to, actor).await
    }

    /// As [`Engine::transition`], but only from `required` when given.
    async fn transition_from(
        &self,
        id: Ulid,
        required: Option<ReservationStatus>,
        to: ReservationStatus,
        actor: Actor,
    ) -> Result<Reservation, BookingError> {
        let listing_id = self
            .store
            .get(&id)
            .ok_or(BookingError::ReservationNotFound(id))?
            .listing_id;

        let mut attempt = 0;
        loop {
            match self.try_transition(listing_id, id, required, to, actor.clone()).await {
                Err(BookingError::StaleState(_)) if attempt < self.config.transition_retries => {
                    attempt += 1;
                    debug!(reservation = %id, attempt, "stale state, retrying transition");
                    tokio::time::sleep(STALE_RETRY_BACKOFF * attempt).await;
                }
                other => return other,
            }
        }
    }

    async fn try_transition(
        &self,
        listing_id: Ulid,
        id: Ulid,
        required: Option<ReservationStatus>,
        to: ReservationStatus,
        actor: Actor,
    ) -> Result<Reservation, BookingError> {
        let mut calendar = self.lock_calendar(listing_id).await?;
        let from = self
            .store
            .get(&id)
            .ok_or(BookingError::ReservationNotFound(id))?
            .status;
        if required.is_some_and(|required| required != from) {
            return Err(BookingError::InvalidTransition { from, to });
        }
        lifecycle::check(from, to)?;

        let store = self.store.clone();
        let notify = self.notify.clone();
        let at = Utc::now();
        let updated = tokio::spawn(async move {
            let updated = store.update_status(id, from, to, actor, at).await?;
            if lifecycle::releases_dates(to) {
                calendar.remove(id);
            }
            announce(&*notify, NotificationKind::for_status(to), &updated);
            Ok::<_, BookingError>(updated)
        })
        .await
        .map_err(|e| BookingError::WalError(format!("commit task failed: {e}")))??;

        metrics::counter!(observability::TRANSITIONS_TOTAL, "to" => to.as_str()).increment(1);
        info!(reservation = %id, %from, %to, "reservation transitioned");
        Ok(updated)
    }
}
