use thiserror::Error;
use ulid::Ulid;

use crate::lifecycle::InvalidTransition;
use crate::model::ReservationStatus;
use crate::pricing::PolicyViolation;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    #[error("listing not found: {0}")]
    ListingNotFound(Ulid),

    #[error("listing {0} is not accepting bookings")]
    ListingInactive(Ulid),

    #[error("policy violation: {0}")]
    PolicyViolation(#[from] PolicyViolation),

    #[error("dates conflict with reservation {conflicting}")]
    DateConflict { conflicting: Ulid },

    /// Exclusive access to the listing calendar was not granted in time.
    #[error("timed out waiting for listing {0}; retry later")]
    AdmissionTimeout(Ulid),

    #[error("reservation not found: {0}")]
    ReservationNotFound(Ulid),

    #[error("cannot move reservation from {from} to {to}")]
    InvalidTransition {
        from: ReservationStatus,
        to: ReservationStatus,
    },

    /// The reservation changed between read and conditional write.
    #[error("reservation {0} was modified concurrently")]
    StaleState(Ulid),

    #[error("already exists: {0}")]
    AlreadyExists(Ulid),

    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),

    #[error("WAL error: {0}")]
    WalError(String),
}

impl From<InvalidTransition> for BookingError {
    fn from(e: InvalidTransition) -> Self {
        BookingError::InvalidTransition { from: e.from, to: e.to }
    }
}

impl BookingError {
    /// Whether the caller may reasonably resubmit the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BookingError::AdmissionTimeout(_) | BookingError::StaleState(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_reason() {
        let id = Ulid::new();
        assert_eq!(
            BookingError::from(PolicyViolation::BelowMinimumStay { nights: 1, minimum: 2 }).to_string(),
            "policy violation: stay of 1 nights is below the minimum of 2"
        );
        assert_eq!(
            BookingError::DateConflict { conflicting: id }.to_string(),
            format!("dates conflict with reservation {id}")
        );
        assert_eq!(
            BookingError::InvalidTransition {
                from: ReservationStatus::Cancelled,
                to: ReservationStatus::Confirmed,
            }
            .to_string(),
            "cannot move reservation from cancelled to confirmed"
        );
    }

    #[test]
    fn only_contention_is_retryable() {
        let id = Ulid::new();
        assert!(BookingError::AdmissionTimeout(id).is_retryable());
        assert!(BookingError::StaleState(id).is_retryable());
        assert!(!BookingError::DateConflict { conflicting: id }.is_retryable());
        assert!(!BookingError::ListingNotFound(id).is_retryable());
    }
}
