use ulid::Ulid;

use crate::model::*;
use crate::pricing;

use super::{BookingError, Engine};

impl Engine {
    /// Whether `stay` could be booked right now, with its price when the
    /// policy accepts it. Takes only the read lock; nothing is reserved.
    pub async fn availability(
        &self,
        listing_id: Ulid,
        stay: Stay,
        guests: u32,
    ) -> Result<Availability, BookingError> {
        let policy = self
            .directory
            .get_policy(listing_id)
            .await
            .ok_or(BookingError::ListingNotFound(listing_id))?;
        if !policy.is_bookable() {
            return Ok(Availability {
                available: false,
                price: None,
                reason: Some("listing is not accepting bookings".into()),
            });
        }

        let price = match pricing::quote(&policy, &stay, guests) {
            Ok(price) => price,
            Err(violation) => {
                return Ok(Availability {
                    available: false,
                    price: None,
                    reason: Some(violation.to_string()),
                });
            }
        };

        let calendar = self.read_calendar(listing_id).await?;
        let reason = calendar
            .conflicting(&stay)
            .map(|_| "dates overlap an existing reservation".to_string());
        Ok(Availability {
            available: reason.is_none(),
            price: Some(price),
            reason,
        })
    }

    pub fn get(&self, id: &Ulid) -> Option<Reservation> {
        self.store.get(id)
    }

    pub fn history(&self, id: &Ulid) -> Vec<StatusChange> {
        self.store.history(id)
    }

    pub fn list_for_listing(&self, listing_id: &Ulid, statuses: &[ReservationStatus]) -> Vec<Reservation> {
        self.store.list_for_listing(listing_id, statuses)
    }

    pub fn list_for_requester(&self, requester_id: &str, statuses: &[ReservationStatus]) -> Vec<Reservation> {
        self.store.list_for_requester(requester_id, statuses)
    }

    /// Rewrite the reservation log down to current state.
    pub async fn compact(&self) -> Result<(), BookingError> {
        self.store.compact().await
    }

    pub async fn appends_since_compact(&self) -> u64 {
        self.store.appends_since_compact().await
    }
}
