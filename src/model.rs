use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Half-open date range `[check_in, check_out)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stay {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl Stay {
    /// No ordering check here: an inverted range is a pricing violation, not a panic.
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Self {
        Self { check_in, check_out }
    }

    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    pub fn overlaps(&self, other: &Stay) -> bool {
        self.check_in < other.check_out && other.check_in < self.check_out
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.check_in <= date && date < self.check_out
    }
}

impl fmt::Display for Stay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.check_in, self.check_out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Active,
    Completed,
    Cancelled,
}

/// Statuses that occupy the listing calendar.
pub const HOLDING_STATUSES: [ReservationStatus; 3] = [
    ReservationStatus::Pending,
    ReservationStatus::Confirmed,
    ReservationStatus::Active,
];

impl ReservationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    pub fn holds_dates(self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "confirmed" => Ok(Self::Confirmed),
            "active" => Ok(Self::Active),
            "completed" => Ok(Self::Completed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            other => Err(format!("unknown reservation status: {other}")),
        }
    }
}

/// Who drove a status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actor {
    Guest(String),
    Host,
    Payment,
    System,
}

/// Host-configured pricing and stay constraints for a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingPolicy {
    pub id: Ulid,
    pub nightly_rate: Decimal,
    pub minimum_stay: u32,
    #[serde(default)]
    pub maximum_stay: Option<u32>,
    pub max_guests: u32,
    pub service_fee_rate: Decimal,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default = "default_true")]
    pub approved: bool,
}

fn default_currency() -> String {
    "USD".into()
}

fn default_true() -> bool {
    true
}

impl ListingPolicy {
    pub fn is_bookable(&self) -> bool {
        self.active && self.approved
    }
}

/// Itemized quote for a stay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub nights: u32,
    pub base_price: Decimal,
    pub service_fee: Decimal,
    pub total: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub listing_id: Ulid,
    pub requester_id: String,
    pub stay: Stay,
    pub guests: u32,
    pub price: Price,
    pub status: ReservationStatus,
    pub special_requests: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

/// One row of the append-only status audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub reservation_id: Ulid,
    /// `None` for the creation entry.
    pub from: Option<ReservationStatus>,
    pub to: ReservationStatus,
    pub at: DateTime<Utc>,
    pub actor: Actor,
}

/// The WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ReservationCreated { reservation: Reservation },
    StatusChanged { change: StatusChange },
}

// ── Requests and query results ───────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub listing_id: Ulid,
    pub requester_id: String,
    pub stay: Stay,
    pub guests: u32,
    pub special_requests: Option<String>,
}

/// Result reported by the payment collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentOutcome {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Availability {
    pub available: bool,
    pub price: Option<Price>,
    /// Why the stay is unavailable, when it is.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn stay_basics() {
        let s = Stay::new(d("2024-06-01"), d("2024-06-04"));
        assert_eq!(s.nights(), 3);
        assert!(s.contains(d("2024-06-01")));
        assert!(s.contains(d("2024-06-03")));
        assert!(!s.contains(d("2024-06-04"))); // half-open
    }

    #[test]
    fn stay_overlap() {
        let a = Stay::new(d("2024-06-01"), d("2024-06-04"));
        let b = Stay::new(d("2024-06-03"), d("2024-06-05"));
        let c = Stay::new(d("2024-06-04"), d("2024-06-06"));
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c)); // back-to-back, not overlapping
    }

    #[test]
    fn inverted_stay_has_negative_nights() {
        let s = Stay::new(d("2024-06-04"), d("2024-06-01"));
        assert_eq!(s.nights(), -3);
    }

    #[test]
    fn terminal_statuses() {
        assert!(ReservationStatus::Completed.is_terminal());
        assert!(ReservationStatus::Cancelled.is_terminal());
        for s in HOLDING_STATUSES {
            assert!(s.holds_dates());
        }
    }

    #[test]
    fn status_parse() {
        assert_eq!("Pending".parse::<ReservationStatus>(), Ok(ReservationStatus::Pending));
        assert_eq!("canceled".parse::<ReservationStatus>(), Ok(ReservationStatus::Cancelled));
        assert!("archived".parse::<ReservationStatus>().is_err());
    }

    #[test]
    fn policy_defaults_from_json() {
        let json = r#"{
            "id": "01HZX3V6W4M6Y0Q8K9N2P5R7T1",
            "nightly_rate": "100.00",
            "minimum_stay": 2,
            "max_guests": 4,
            "service_fee_rate": "0.10"
        }"#;
        let policy: ListingPolicy = serde_json::from_str(json).unwrap();
        assert_eq!(policy.currency, "USD");
        assert_eq!(policy.maximum_stay, None);
        assert!(policy.is_bookable());
    }

    #[test]
    fn event_serialization_roundtrip() {
        let now = Utc::now();
        let event = Event::StatusChanged {
            change: StatusChange {
                reservation_id: Ulid::new(),
                from: Some(ReservationStatus::Pending),
                to: ReservationStatus::Confirmed,
                at: now,
                actor: Actor::Guest("alice".into()),
            },
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
