//! Authoritative stay pricing.
//!
//! [`quote`] is a pure function of the listing policy, the stay and the guest
//! count. It reads no clock and holds no state, so a stored quote can always be
//! reproduced from the policy snapshot it was computed against.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use thiserror::Error;

use crate::model::{ListingPolicy, Price, Stay};

/// Money amounts carry two decimal places.
pub const MONEY_SCALE: u32 = 2;

/// A request that the listing policy does not admit.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyViolation {
    /// Check-out is not after check-in
    #[error("check-out must be at least one night after check-in")]
    InvalidRange,

    #[error("stay of {nights} nights is below the minimum of {minimum}")]
    BelowMinimumStay { nights: i64, minimum: u32 },

    #[error("stay of {nights} nights is above the maximum of {maximum}")]
    AboveMaximumStay { nights: i64, maximum: u32 },

    #[error("{guests} guests exceeds the listing capacity of {max_guests}")]
    CapacityExceeded { guests: u32, max_guests: u32 },

    #[error("at least one guest is required")]
    NoGuests,

    #[error("stay price exceeds the representable amount")]
    PriceOverflow,
}

/// Price a stay against a policy snapshot.
///
/// Checks run in a fixed order (range, minimum, maximum, capacity) so the
/// reported violation is stable for a given input.
pub fn quote(policy: &ListingPolicy, stay: &Stay, guests: u32) -> Result<Price, PolicyViolation> {
    let nights = stay.nights();
    if nights < 1 {
        return Err(PolicyViolation::InvalidRange);
    }
    if nights < i64::from(policy.minimum_stay) {
        return Err(PolicyViolation::BelowMinimumStay {
            nights,
            minimum: policy.minimum_stay,
        });
    }
    if let Some(maximum) = policy.maximum_stay
        && nights > i64::from(maximum)
    {
        return Err(PolicyViolation::AboveMaximumStay { nights, maximum });
    }
    if guests == 0 {
        return Err(PolicyViolation::NoGuests);
    }
    if guests > policy.max_guests {
        return Err(PolicyViolation::CapacityExceeded {
            guests,
            max_guests: policy.max_guests,
        });
    }

    let base_price = policy
        .nightly_rate
        .checked_mul(Decimal::from(nights))
        .map(round_money)
        .ok_or(PolicyViolation::PriceOverflow)?;
    let service_fee = base_price
        .checked_mul(policy.service_fee_rate)
        .map(round_money)
        .ok_or(PolicyViolation::PriceOverflow)?;
    let total = base_price
        .checked_add(service_fee)
        .ok_or(PolicyViolation::PriceOverflow)?;

    Ok(Price {
        // nights >= 1 and bounded by the span of NaiveDate
        nights: nights as u32,
        base_price,
        service_fee,
        total,
        currency: policy.currency.clone(),
    })
}

/// Half-up to two places, then pin the scale so `300` prints as `300.00`.
fn round_money(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(MONEY_SCALE);
    rounded
}
