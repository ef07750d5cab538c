use chrono::NaiveDateTime;

use crate::model::*;

use super::error::Rejection;

/// Active (non-cancelled) reservations of one court, sorted by `span.start`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Occupancy {
    entries: Vec<(ReservationId, Span)>,
}

impl Occupancy {
    pub fn from_reservations<'a>(reservations: impl IntoIterator<Item = &'a Reservation>) -> Self {
        let mut entries: Vec<(ReservationId, Span)> = reservations
            .into_iter()
            .filter(|r| r.is_active())
            .map(|r| (r.id, r.span()))
            .collect();
        entries.sort_by_key(|(_, s)| s.start);
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn spans(&self) -> impl Iterator<Item = Span> + '_ {
        self.entries.iter().map(|(_, s)| *s)
    }

    /// Hypothetical copy with one more occupied span.
    pub fn with(&self, id: ReservationId, span: Span) -> Self {
        let mut entries = self.entries.clone();
        let pos = entries.partition_point(|(_, s)| s.start <= span.start);
        entries.insert(pos, (id, span));
        Self { entries }
    }

    /// Entries whose span overlaps `query`.
    /// Uses binary search to skip entries starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &(ReservationId, Span)> {
        let right_bound = self.entries.partition_point(|(_, s)| s.start < query.end);
        let query = *query;
        self.entries[..right_bound]
            .iter()
            .filter(move |(_, s)| s.end > query.start)
    }

    pub fn is_free(&self, span: &Span) -> bool {
        self.overlapping(span).next().is_none()
    }

    /// Start of the first reservation beginning at or after `t`.
    pub fn next_start_from(&self, t: NaiveDateTime) -> Option<NaiveDateTime> {
        let idx = self.entries.partition_point(|(_, s)| s.start < t);
        self.entries.get(idx).map(|(_, s)| s.start)
    }

    /// Latest end among reservations finishing at or before `t`.
    pub fn last_end_until(&self, t: NaiveDateTime) -> Option<NaiveDateTime> {
        let right_bound = self.entries.partition_point(|(_, s)| s.start < t);
        self.entries[..right_bound]
            .iter()
            .map(|(_, s)| s.end)
            .filter(|end| *end <= t)
            .max()
    }
}

/// Fails with the first overlapping reservation, in start order.
pub fn check_no_conflict(occupancy: &Occupancy, span: &Span) -> Result<(), Rejection> {
    match occupancy.overlapping(span).next() {
        Some((id, _)) => Err(Rejection::Occupied { by: *id }),
        None => Ok(()),
    }
}
