use chrono::NaiveDate;

use crate::model::*;

use super::conflict::{check_no_conflict, Occupancy};
use super::error::Rejection;
use super::holes::{count_holes, GapGauge};
use super::schedule::containing_window;

/// Point-in-time view of one court on one date: its windows and the active
/// reservations overlapping them. Everything derived from it is pure.
#[derive(Debug, Clone)]
pub struct CourtDay {
    pub court_id: CourtId,
    pub date: NaiveDate,
    pub windows: Vec<Span>,
    pub occupancy: Occupancy,
}

impl CourtDay {
    pub fn new(court_id: CourtId, date: NaiveDate, windows: Vec<Span>, reservations: &[Reservation]) -> Self {
        Self {
            court_id,
            date,
            windows,
            occupancy: Occupancy::from_reservations(reservations),
        }
    }

    /// Schedule, conflict, then gap rules, stopping at the first failure.
    pub fn assess(&self, span: &Span, granularity: Minutes) -> Result<(), Rejection> {
        let window = containing_window(&self.windows, span).ok_or(Rejection::OutOfSchedule)?;
        check_no_conflict(&self.occupancy, span)?;
        GapGauge::new(window, &self.occupancy, granularity).check(span)
    }

    /// Sub-granularity holes across every window of the day.
    pub fn hole_count(&self, granularity: Minutes) -> usize {
        self.windows
            .iter()
            .map(|w| count_holes(w, &self.occupancy, granularity))
            .sum()
    }
}
