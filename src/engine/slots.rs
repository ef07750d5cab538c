use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use serde::Serialize;

use crate::model::*;

use super::day::CourtDay;
use super::schedule::align_up;

/// One start time across every court: bookable anywhere?
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeSlot {
    pub start: NaiveDateTime,
    pub available: bool,
    /// Courts with at least one bookable duration at `start`.
    pub courts: usize,
}

/// Bookable durations for one court at one start time, in offered order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotRow {
    pub start: NaiveDateTime,
    pub durations: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourtAvailability {
    pub court_id: CourtId,
    /// Every grid start inside the court's windows, sorted.
    pub rows: Vec<SlotRow>,
}

impl CourtAvailability {
    pub fn row(&self, start: NaiveDateTime) -> Option<&SlotRow> {
        self.rows
            .binary_search_by_key(&start, |r| r.start)
            .ok()
            .map(|i| &self.rows[i])
    }

    pub fn valid_durations(&self, start: NaiveDateTime) -> &[u32] {
        self.row(start).map_or(&[], |r| r.durations.as_slice())
    }

    pub fn is_bookable(&self, start: NaiveDateTime, minutes: u32) -> bool {
        self.valid_durations(start).contains(&minutes)
    }

    pub fn first_valid_duration(&self, start: NaiveDateTime) -> Option<u32> {
        self.valid_durations(start).first().copied()
    }

    /// Keep `selected` while it is still bookable; otherwise fall back to the
    /// first duration that is.
    pub fn reselect_duration(&self, start: NaiveDateTime, selected: Option<u32>) -> Option<u32> {
        match selected {
            Some(d) if self.is_bookable(start, d) => Some(d),
            _ => self.first_valid_duration(start),
        }
    }

    pub fn bookable_starts(&self) -> impl Iterator<Item = NaiveDateTime> + '_ {
        self.rows
            .iter()
            .filter(|r| !r.durations.is_empty())
            .map(|r| r.start)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Availability {
    pub date: NaiveDate,
    pub granularity: Minutes,
    /// Offered durations the matrix was computed for, in offered order.
    pub durations: Vec<u32>,
    pub slots: Vec<TimeSlot>,
    pub courts: Vec<CourtAvailability>,
}

impl Availability {
    pub fn court(&self, court_id: CourtId) -> Option<&CourtAvailability> {
        self.courts.iter().find(|c| c.court_id == court_id)
    }

    pub fn slot(&self, start: NaiveDateTime) -> Option<&TimeSlot> {
        self.slots
            .binary_search_by_key(&start, |s| s.start)
            .ok()
            .map(|i| &self.slots[i])
    }

    /// First offered duration bookable at `start` on any court.
    pub fn first_valid_duration(&self, start: NaiveDateTime) -> Option<u32> {
        self.durations.iter().copied().find(|d| {
            self.courts.iter().any(|c| c.is_bookable(start, *d))
        })
    }

    /// Re-validate a caller's selection after the date, time or court changed.
    /// `court_id = None` means any court.
    pub fn reselect_duration(
        &self,
        court_id: Option<CourtId>,
        start: NaiveDateTime,
        selected: Option<u32>,
    ) -> Option<u32> {
        match court_id {
            Some(id) => self.court(id)?.reselect_duration(start, selected),
            None => match selected {
                Some(d) if self.courts.iter().any(|c| c.is_bookable(start, d)) => Some(d),
                _ => self.first_valid_duration(start),
            },
        }
    }
}

/// Grid starts inside `windows`, strictly after `now` when given.
pub fn candidate_starts(windows: &[Span], granularity: Minutes, now: Option<NaiveDateTime>) -> Vec<NaiveDateTime> {
    let step = TimeDelta::minutes(granularity);
    let mut starts = Vec::new();
    for window in windows {
        let mut t = align_up(window.start, granularity);
        while t < window.end {
            if now.is_none_or(|n| t > n) {
                starts.push(t);
            }
            t += step;
        }
    }
    starts.sort();
    starts.dedup();
    starts
}

/// Evaluate every (court, start, duration) triple for one date.
pub fn enumerate(
    date: NaiveDate,
    days: &[CourtDay],
    durations: &[u32],
    granularity: Minutes,
    now: Option<NaiveDateTime>,
) -> Availability {
    let courts: Vec<CourtAvailability> = days
        .iter()
        .map(|day| enumerate_court(day, durations, granularity, now))
        .collect();

    let mut starts: Vec<NaiveDateTime> = courts
        .iter()
        .flat_map(|c| c.rows.iter().map(|r| r.start))
        .collect();
    starts.sort();
    starts.dedup();

    let slots = starts
        .into_iter()
        .map(|start| {
            let open = courts
                .iter()
                .filter(|c| !c.valid_durations(start).is_empty())
                .count();
            TimeSlot {
                start,
                available: open > 0,
                courts: open,
            }
        })
        .collect();

    Availability {
        date,
        granularity,
        durations: durations.to_vec(),
        slots,
        courts,
    }
}

fn enumerate_court(
    day: &CourtDay,
    durations: &[u32],
    granularity: Minutes,
    now: Option<NaiveDateTime>,
) -> CourtAvailability {
    let rows = candidate_starts(&day.windows, granularity, now)
        .into_iter()
        .map(|start| {
            let durations = durations
                .iter()
                .copied()
                .filter(|d| {
                    let span = Span::from_start(start, Minutes::from(*d));
                    day.assess(&span, granularity).is_ok()
                })
                .collect();
            SlotRow { start, durations }
        })
        .collect();
    CourtAvailability {
        court_id: day.court_id,
        rows,
    }
}
