use ulid::Ulid;

use crate::model::{Reservation, Stay};

/// A reserved interval on a listing calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub reservation_id: Ulid,
    pub stay: Stay,
}

/// Per-listing interval set of reservations that still hold their dates,
/// sorted by `check_in`.
#[derive(Debug, Clone, Default)]
pub struct CalendarIndex {
    entries: Vec<Entry>,
}

impl CalendarIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from the store. Terminal reservations are skipped.
    pub fn from_reservations<'a>(
        listing_id: Ulid,
        reservations: impl IntoIterator<Item = &'a Reservation>,
    ) -> Self {
        let mut index = Self::new();
        for r in reservations {
            if r.listing_id == listing_id && r.status.holds_dates() {
                index.insert(r.stay, r.id);
            }
        }
        index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Entries whose stay intersects `query`.
    /// Binary search skips everything checking in at or after `query.check_out`.
    pub fn overlapping(&self, query: &Stay) -> impl Iterator<Item = &Entry> {
        let right_bound = self
            .entries
            .partition_point(|e| e.stay.check_in < query.check_out);
        self.entries[..right_bound]
            .iter()
            .filter(move |e| e.stay.check_out > query.check_in)
    }

    pub fn overlaps(&self, query: &Stay) -> bool {
        self.overlapping(query).next().is_some()
    }

    /// Id of the first reservation that intersects `query`, if any.
    pub fn conflicting(&self, query: &Stay) -> Option<Ulid> {
        self.overlapping(query).next().map(|e| e.reservation_id)
    }

    /// Insert keeping sort order. The caller has already checked `overlaps`
    /// under the same write guard.
    pub fn insert(&mut self, stay: Stay, reservation_id: Ulid) {
        let pos = self
            .entries
            .binary_search_by_key(&stay.check_in, |e| e.stay.check_in)
            .unwrap_or_else(|e| e);
        self.entries.insert(pos, Entry { reservation_id, stay });
    }

    pub fn remove(&mut self, reservation_id: Ulid) -> Option<Stay> {
        let pos = self
            .entries
            .iter()
            .position(|e| e.reservation_id == reservation_id)?;
        Some(self.entries.remove(pos).stay)
    }

    pub fn contains(&self, reservation_id: Ulid) -> bool {
        self.entries.iter().any(|e| e.reservation_id == reservation_id)
    }
}
