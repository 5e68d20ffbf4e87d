//! Legal reservation status transitions.
//!
//! ```text
//! pending ──confirm──▶ confirmed ──(today ≥ check_in)──▶ active
//!    │                    │  │                              │
//!    └──cancel──▶ cancelled ◀┘  └──(today ≥ check_out)──▶ completed ◀┘
//! ```
//!
//! Explicit transitions come from callers (guest, host, payment). Derived ones
//! are computed from the calendar date by [`derived_status`].

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::model::{ReservationStatus, Stay};

use ReservationStatus::*;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[error("cannot move reservation from {from} to {to}")]
pub struct InvalidTransition {
    pub from: ReservationStatus,
    pub to: ReservationStatus,
}

/// Check that `from → to` is a legal edge.
pub fn check(from: ReservationStatus, to: ReservationStatus) -> Result<(), InvalidTransition> {
    let legal = matches!(
        (from, to),
        (Pending, Confirmed)
            | (Pending, Cancelled)
            | (Confirmed, Cancelled)
            | (Confirmed, Active)
            | (Confirmed, Completed)
            | (Active, Completed)
    );
    if legal {
        Ok(())
    } else {
        Err(InvalidTransition { from, to })
    }
}

/// Whether applying `to` frees the reservation's calendar interval.
pub fn releases_dates(to: ReservationStatus) -> bool {
    to.is_terminal()
}

/// The status a reservation should be in on `today`, if different from
/// `status`. Only confirmed and active reservations move with the date;
/// pending ones wait for an explicit decision.
pub fn derived_status(status: ReservationStatus, stay: &Stay, today: NaiveDate) -> Option<ReservationStatus> {
    match status {
        Confirmed | Active if today >= stay.check_out => Some(Completed),
        Confirmed if stay.contains(today) => Some(Active),
        _ => None,
    }
}
