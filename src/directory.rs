//! Listing directory: the external owner of listing policies.
//!
//! The admission path only ever reads through [`ListingDirectory`]. Policies
//! may change between requests; each quote uses whatever snapshot
//! `get_policy` returns at that moment.

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use ulid::Ulid;

use crate::limits::{CURRENCY_CODE_LEN, MAX_GUESTS, MAX_STAY_NIGHTS};
use crate::model::ListingPolicy;
use crate::pricing::MONEY_SCALE;

#[async_trait]
pub trait ListingDirectory: Send + Sync {
    async fn get_policy(&self, listing_id: Ulid) -> Option<ListingPolicy>;
}

/// Process-local directory, used by the server binary and tests.
#[derive(Default)]
pub struct InMemoryDirectory {
    policies: DashMap<Ulid, ListingPolicy>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a policy after checking it is internally consistent.
    pub fn upsert(&self, policy: ListingPolicy) -> Result<(), String> {
        validate_policy(&policy)?;
        self.policies.insert(policy.id, policy);
        Ok(())
    }

    /// Returns false if the listing is unknown.
    pub fn set_active(&self, listing_id: Ulid, active: bool) -> bool {
        match self.policies.get_mut(&listing_id) {
            Some(mut p) => {
                p.active = active;
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

#[async_trait]
impl ListingDirectory for InMemoryDirectory {
    async fn get_policy(&self, listing_id: Ulid) -> Option<ListingPolicy> {
        self.policies.get(&listing_id).map(|p| p.value().clone())
    }
}

pub fn validate_policy(policy: &ListingPolicy) -> Result<(), String> {
    if policy.nightly_rate.is_sign_negative() || policy.nightly_rate.is_zero() {
        return Err("nightly_rate must be positive".into());
    }
    if policy.nightly_rate.normalize().scale() > MONEY_SCALE {
        return Err(format!("nightly_rate has more than {MONEY_SCALE} decimal places"));
    }
    if policy.service_fee_rate.is_sign_negative() || policy.service_fee_rate > Decimal::ONE {
        return Err("service_fee_rate must be between 0 and 1".into());
    }
    if policy.minimum_stay < 1 {
        return Err("minimum_stay must be at least 1".into());
    }
    if let Some(max) = policy.maximum_stay {
        if max < policy.minimum_stay {
            return Err("maximum_stay must not be below minimum_stay".into());
        }
        if i64::from(max) > MAX_STAY_NIGHTS {
            return Err(format!("maximum_stay must not exceed {MAX_STAY_NIGHTS}"));
        }
    }
    if policy.max_guests < 1 || policy.max_guests > MAX_GUESTS {
        return Err(format!("max_guests must be between 1 and {MAX_GUESTS}"));
    }
    if policy.currency.len() != CURRENCY_CODE_LEN || !policy.currency.chars().all(|c| c.is_ascii_uppercase()) {
        return Err("currency must be a three-letter uppercase code".into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn policy() -> ListingPolicy {
        ListingPolicy {
            id: Ulid::new(),
            nightly_rate: dec!(100.00),
            minimum_stay: 2,
            maximum_stay: None,
            max_guests: 4,
            service_fee_rate: dec!(0.10),
            currency: "USD".into(),
            active: true,
            approved: true,
        }
    }

    #[tokio::test]
    async fn upsert_then_get() {
        let dir = InMemoryDirectory::new();
        let p = policy();
        dir.upsert(p.clone()).unwrap();
        assert_eq!(dir.get_policy(p.id).await, Some(p));
        assert_eq!(dir.get_policy(Ulid::new()).await, None);
    }

    #[tokio::test]
    async fn policy_change_is_visible_to_next_read() {
        let dir = InMemoryDirectory::new();
        let mut p = policy();
        dir.upsert(p.clone()).unwrap();
        p.nightly_rate = dec!(120.00);
        dir.upsert(p.clone()).unwrap();
        assert_eq!(dir.get_policy(p.id).await.unwrap().nightly_rate, dec!(120.00));
    }

    #[tokio::test]
    async fn deactivate() {
        let dir = InMemoryDirectory::new();
        let p = policy();
        dir.upsert(p.clone()).unwrap();
        assert!(dir.set_active(p.id, false));
        assert!(!dir.get_policy(p.id).await.unwrap().is_bookable());
        assert!(!dir.set_active(Ulid::new(), false));
    }

    #[test]
    fn rejects_inconsistent_policies() {
        let mut p = policy();
        p.nightly_rate = dec!(0);
        assert!(validate_policy(&p).is_err());

        let mut p = policy();
        p.nightly_rate = dec!(10.005);
        assert!(validate_policy(&p).is_err());

        let mut p = policy();
        p.maximum_stay = Some(1);
        assert!(validate_policy(&p).is_err());

        let mut p = policy();
        p.minimum_stay = 0;
        assert!(validate_policy(&p).is_err());

        let mut p = policy();
        p.service_fee_rate = dec!(1.5);
        assert!(validate_policy(&p).is_err());

        let mut p = policy();
        p.currency = "usd".into();
        assert!(validate_policy(&p).is_err());

        let mut p = policy();
        p.max_guests = 0;
        assert!(validate_policy(&p).is_err());
    }

    #[test]
    fn trailing_zeros_are_fine() {
        let mut p = policy();
        p.nightly_rate = dec!(99.5000);
        assert!(validate_policy(&p).is_ok());
    }
}
