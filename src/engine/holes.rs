//! Gap rules around a candidate booking.
//!
//! Every booking is at least one granularity unit long and sits on the grid,
//! so free time shorter than the granularity between two boundaries can
//! never be sold. A candidate may not create such a hole. It may sit next
//! to one that already existed without it (a trapped slot).

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::debug;

use crate::model::*;

use super::conflict::Occupancy;
use super::error::Rejection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Before,
    After,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Before, Side::After];
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Before => f.write_str("before the booking"),
            Side::After => f.write_str("after the booking"),
        }
    }
}

/// Outcome of comparing a side's gap with and without the candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GapClass {
    /// No sub-granularity gap on this side.
    Clean,
    /// The candidate turns bookable time into a hole.
    NewHole,
    /// The hole was already there; the candidate is not its cause.
    Trapped,
}

pub fn is_hole(gap: Minutes, granularity: Minutes) -> bool {
    gap > 0 && gap < granularity
}

pub fn is_newly_created_hole(with: Minutes, without: Minutes, granularity: Minutes) -> bool {
    is_hole(with, granularity) && !is_hole(without, granularity)
}

pub fn is_preexisting_hole(with: Minutes, without: Minutes, granularity: Minutes) -> bool {
    is_hole(with, granularity) && is_hole(without, granularity)
}

pub fn classify(with: Minutes, without: Minutes, granularity: Minutes) -> GapClass {
    if is_newly_created_hole(with, without, granularity) {
        GapClass::NewHole
    } else if is_preexisting_hole(with, without, granularity) {
        GapClass::Trapped
    } else {
        GapClass::Clean
    }
}

/// Gap measurements for candidates inside one operating window.
#[derive(Debug, Clone, Copy)]
pub struct GapGauge<'a> {
    window: Span,
    occupancy: &'a Occupancy,
    granularity: Minutes,
}

impl<'a> GapGauge<'a> {
    pub fn new(window: Span, occupancy: &'a Occupancy, granularity: Minutes) -> Self {
        Self {
            window,
            occupancy,
            granularity,
        }
    }

    /// Nearest boundary from `at` looking towards `side`: a reservation edge
    /// or the window edge, whichever is closer.
    pub fn boundary(&self, side: Side, at: NaiveDateTime) -> NaiveDateTime {
        match side {
            Side::After => self
                .occupancy
                .next_start_from(at)
                .map_or(self.window.end, |start| start.min(self.window.end)),
            Side::Before => self
                .occupancy
                .last_end_until(at)
                .map_or(self.window.start, |end| end.max(self.window.start)),
        }
    }

    /// Free minutes between the candidate and the boundary on `side`.
    pub fn gap_with(&self, side: Side, candidate: &Span) -> Minutes {
        match side {
            Side::After => (self.boundary(Side::After, candidate.end) - candidate.end).num_minutes(),
            Side::Before => {
                (candidate.start - self.boundary(Side::Before, candidate.start)).num_minutes()
            }
        }
    }

    /// The same measurement with the candidate absent. Both sides then see
    /// one free stretch, between the boundaries flanking the candidate.
    ///
    /// Boundaries are taken as they are, on the grid or not. An off-grid
    /// edge left by an imported booking keeps its sub-grid remnant, and the
    /// grid slot holding that remnant can never be sold.
    pub fn gap_without(&self, candidate: &Span) -> Minutes {
        let previous = self.boundary(Side::Before, candidate.start);
        let next = self.boundary(Side::After, candidate.end);
        (next - previous).num_minutes()
    }

    pub fn classify(&self, side: Side, candidate: &Span) -> GapClass {
        classify(
            self.gap_with(side, candidate),
            self.gap_without(candidate),
            self.granularity,
        )
    }

    /// Reject the first side (before, then after) where the candidate would
    /// create a new hole. A clean side never excuses the other one.
    pub fn check(&self, candidate: &Span) -> Result<(), Rejection> {
        for side in Side::BOTH {
            match self.classify(side, candidate) {
                GapClass::Clean => {}
                GapClass::Trapped => {
                    debug!(
                        "trapped gap {side} [{}, {}), waived",
                        candidate.start, candidate.end
                    );
                }
                GapClass::NewHole => {
                    return Err(Rejection::WouldCreateHole {
                        side,
                        gap_minutes: self.gap_with(side, candidate),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Count maximal free stretches inside `window` shorter than the granularity.
pub fn count_holes(window: &Span, occupancy: &Occupancy, granularity: Minutes) -> usize {
    let mut holes = 0;
    let mut cursor = window.start;
    for span in occupancy.spans() {
        if span.end <= window.start || span.start >= window.end {
            continue;
        }
        if span.start > cursor && is_hole((span.start - cursor).num_minutes(), granularity) {
            holes += 1;
        }
        cursor = cursor.max(span.end);
    }
    if window.end > cursor && is_hole((window.end - cursor).num_minutes(), granularity) {
        holes += 1;
    }
    holes
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use ulid::Ulid;

    use super::*;

    const G: Minutes = 30;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn span(a: (u32, u32), b: (u32, u32)) -> Span {
        Span::new(at(a.0, a.1), at(b.0, b.1))
    }

    fn occupied(spans: &[Span]) -> Occupancy {
        let list: Vec<Reservation> = spans
            .iter()
            .map(|s| Reservation {
                id: Ulid::new(),
                court_id: Ulid::nil(),
                start: s.start,
                duration_minutes: s.minutes() as u32,
                status: ReservationStatus::Confirmed,
                addons: Addons::NONE,
                price_owed: 0,
                label: None,
            })
            .collect();
        Occupancy::from_reservations(&list)
    }

    // ── predicates ────────────────────────────────────────

    #[test]
    fn hole_bounds_are_strict() {
        assert!(!is_hole(0, G));
        assert!(is_hole(1, G));
        assert!(is_hole(29, G));
        assert!(!is_hole(30, G));
    }

    #[test]
    fn predicates_are_independent() {
        // New: gap appears where the stretch was bookable.
        assert!(is_newly_created_hole(15, 105, G));
        assert!(!is_preexisting_hole(15, 105, G));
        // Trapped: the stretch was already too short.
        assert!(!is_newly_created_hole(10, 20, G));
        assert!(is_preexisting_hole(10, 20, G));
        // No hole at all.
        assert!(!is_newly_created_hole(0, 20, G));
        assert!(!is_preexisting_hole(0, 20, G));
        assert_eq!(classify(15, 105, G), GapClass::NewHole);
        assert_eq!(classify(10, 20, G), GapClass::Trapped);
        assert_eq!(classify(30, 90, G), GapClass::Clean);
    }

    // ── gauge ─────────────────────────────────────────────

    #[test]
    fn exact_granularity_gap_is_clean() {
        // Window 08:00–23:00, booking 10:00–11:00; 09:00–09:30 leaves exactly 30.
        let occ = occupied(&[span((10, 0), (11, 0))]);
        let gauge = GapGauge::new(span((8, 0), (23, 0)), &occ, G);
        let c = span((9, 0), (9, 30));
        assert_eq!(gauge.gap_with(Side::After, &c), 30);
        assert_eq!(gauge.gap_with(Side::Before, &c), 60);
        assert!(gauge.check(&c).is_ok());
    }

    #[test]
    fn zero_gap_is_clean() {
        let occ = occupied(&[span((9, 0), (10, 0)), span((10, 30), (11, 0))]);
        let gauge = GapGauge::new(span((8, 0), (23, 0)), &occ, G);
        let c = span((8, 0), (9, 0));
        assert_eq!(gauge.gap_with(Side::Before, &c), 0);
        assert_eq!(gauge.gap_with(Side::After, &c), 0);
        assert!(gauge.check(&c).is_ok());
    }

    #[test]
    fn off_grid_window_end_rejects_fragmenting_candidate() {
        let occ = Occupancy::default();
        let gauge = GapGauge::new(span((8, 0), (22, 45)), &occ, G);
        let c = span((22, 0), (22, 30));
        assert_eq!(gauge.classify(Side::After, &c), GapClass::NewHole);
        assert_eq!(
            gauge.check(&c),
            Err(Rejection::WouldCreateHole {
                side: Side::After,
                gap_minutes: 15
            })
        );
        // Ending 45 minutes early leaves a sellable gap.
        assert!(gauge.check(&span((21, 0), (22, 0))).is_ok());
    }

    #[test]
    fn clean_side_does_not_excuse_the_other() {
        // An imported booking ends off-grid at 10:15.
        let occ = occupied(&[span((9, 0), (10, 15))]);
        let gauge = GapGauge::new(span((8, 0), (23, 0)), &occ, G);
        let c = span((10, 30), (11, 30));
        assert_eq!(gauge.classify(Side::After, &c), GapClass::Clean);
        assert_eq!(
            gauge.check(&c),
            Err(Rejection::WouldCreateHole {
                side: Side::Before,
                gap_minutes: 15
            })
        );
    }

    #[test]
    fn boundaries_clip_to_window() {
        // Reservations outside the window do not pull boundaries past its edges.
        let occ = occupied(&[span((7, 0), (7, 30)), span((23, 30), (23, 45))]);
        let gauge = GapGauge::new(span((8, 0), (23, 0)), &occ, G);
        assert_eq!(gauge.boundary(Side::Before, at(9, 0)), at(8, 0));
        assert_eq!(gauge.boundary(Side::After, at(22, 0)), at(23, 0));
    }

    #[test]
    fn trapped_gap_is_waived_and_may_shrink() {
        // 10:00–10:20 is already a 20-minute hole. A 10-minute hypothetical
        // span inside it leaves 10 minutes: trapped, not new.
        let occ = occupied(&[span((9, 0), (10, 0)), span((10, 20), (11, 0))]);
        let window = span((8, 0), (23, 0));
        let gauge = GapGauge::new(window, &occ, G);
        let c = span((10, 0), (10, 10));
        assert_eq!(gauge.gap_with(Side::After, &c), 10);
        assert_eq!(gauge.gap_without(&c), 20);
        assert_eq!(gauge.classify(Side::After, &c), GapClass::Trapped);
        assert!(gauge.check(&c).is_ok());

        let after = occ.with(Ulid::new(), c);
        assert_eq!(count_holes(&window, &occ, G), 1);
        assert_eq!(count_holes(&window, &after, G), 1);
    }

    #[test]
    fn unrelated_trapped_gap_does_not_affect_candidate() {
        // 10:00–10:15 is trapped; 08:00–09:00 is judged on its own edges.
        let occ = occupied(&[span((9, 0), (10, 0)), span((10, 15), (11, 0))]);
        let window = span((8, 0), (23, 0));
        let gauge = GapGauge::new(window, &occ, G);
        let c = span((8, 0), (9, 0));
        for side in Side::BOTH {
            assert_eq!(gauge.classify(side, &c), GapClass::Clean);
        }
        assert!(gauge.check(&c).is_ok());
        let after = occ.with(Ulid::new(), c);
        assert_eq!(count_holes(&window, &occ, G), 1);
        assert_eq!(count_holes(&window, &after, G), 1);
    }

    // ── census ────────────────────────────────────────────

    #[test]
    fn count_holes_walks_window() {
        let window = span((8, 0), (12, 0));
        assert_eq!(count_holes(&window, &Occupancy::default(), G), 0);
        let occ = occupied(&[
            span((8, 10), (9, 0)),   // 10 min hole at the window start
            span((9, 20), (10, 0)),  // 20 min hole between
            span((10, 30), (11, 50)), // 30 min gap is fine; 10 min hole at the end
        ]);
        assert_eq!(count_holes(&window, &occ, G), 3);
    }

    #[test]
    fn accepted_candidates_never_add_holes() {
        // Imported off-grid bookings plus an off-grid window end.
        let window = span((8, 0), (22, 45));
        let occ = occupied(&[span((9, 0), (10, 15)), span((12, 15), (13, 0)), span((17, 0), (18, 0))]);
        let gauge = GapGauge::new(window, &occ, G);
        let before = count_holes(&window, &occ, G);

        let mut start = window.start;
        while start < window.end {
            for minutes in [30, 60, 90, 120] {
                let c = Span::from_start(start, minutes);
                if !window.contains_span(&c) || !occ.is_free(&c) {
                    continue;
                }
                let after = count_holes(&window, &occ.with(Ulid::new(), c), G);
                match gauge.check(&c) {
                    Ok(()) => assert_eq!(after, before, "accepted {c:?} changed hole count"),
                    Err(Rejection::WouldCreateHole { .. }) => {
                        assert!(after > before, "rejected {c:?} but no hole appeared")
                    }
                    Err(other) => panic!("unexpected rejection {other:?}"),
                }
            }
            start += chrono::TimeDelta::minutes(G);
        }
    }
}
