use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::notify::NotificationKind;
use crate::observability;
use crate::pricing;

use super::{BookingError, Engine, announce};

impl Engine {
    /// Admit a booking request as a `pending` reservation.
    ///
    /// Admissions on one listing are serialized by its calendar lock; the
    /// loser of two overlapping requests sees the winner's interval.
    pub async fn submit(&self, request: BookingRequest) -> Result<Reservation, BookingError> {
        let started = Instant::now();
        let listing_id = request.listing_id;
        let result = self.admit(request).await;

        let outcome = match &result {
            Ok(_) => "admitted",
            Err(e) => observability::error_label(e),
        };
        metrics::counter!(observability::ADMISSIONS_TOTAL, "outcome" => outcome).increment(1);
        metrics::histogram!(observability::ADMISSION_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        match &result {
            Ok(r) => info!(listing = %listing_id, reservation = %r.id, stay = %r.stay, "booking admitted"),
            Err(e) => debug!(listing = %listing_id, "booking rejected: {e}"),
        }
        result
    }

    async fn admit(&self, request: BookingRequest) -> Result<Reservation, BookingError> {
        check_request_limits(&request)?;

        let policy = self
            .directory
            .get_policy(request.listing_id)
            .await
            .ok_or(BookingError::ListingNotFound(request.listing_id))?;
        if !policy.is_bookable() {
            return Err(BookingError::ListingInactive(request.listing_id));
        }

        let mut calendar = self.lock_calendar(request.listing_id).await?;

        let price = pricing::quote(&policy, &request.stay, request.guests)?;
        if let Some(conflicting) = calendar.conflicting(&request.stay) {
            return Err(BookingError::DateConflict { conflicting });
        }
        if calendar.len() >= MAX_RESERVATIONS_PER_CALENDAR {
            return Err(BookingError::LimitExceeded("too many reservations on listing calendar"));
        }

        let now = Utc::now();
        let reservation = Reservation {
            id: Ulid::new(),
            listing_id: request.listing_id,
            requester_id: request.requester_id,
            stay: request.stay,
            guests: request.guests,
            price,
            status: ReservationStatus::Pending,
            special_requests: request.special_requests,
            created_at: now,
            updated_at: now,
            confirmed_at: None,
            cancelled_at: None,
        };

        // The commit owns the calendar guard, so a dropped caller cannot
        // split the store write from the index insert or the announcement.
        let store = self.store.clone();
        let notify = self.notify.clone();
        tokio::spawn(async move {
            let reservation = store.create(reservation).await?;
            calendar.insert(reservation.stay, reservation.id);
            announce(&*notify, NotificationKind::Created, &reservation);
            Ok::<_, BookingError>(reservation)
        })
        .await
        .map_err(|e| BookingError::WalError(format!("commit task failed: {e}")))?
    }
}

fn check_request_limits(request: &BookingRequest) -> Result<(), BookingError> {
    if request.requester_id.len() > MAX_REQUESTER_ID_LEN {
        return Err(BookingError::LimitExceeded("requester id too long"));
    }
    if let Some(ref notes) = request.special_requests
        && notes.len() > MAX_SPECIAL_REQUESTS_LEN {
            return Err(BookingError::LimitExceeded("special requests too long"));
        }
    if request.stay.nights() > MAX_STAY_NIGHTS {
        return Err(BookingError::LimitExceeded("stay too long"));
    }
    Ok(())
}
