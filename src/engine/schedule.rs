use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};

use crate::model::*;

// ── Operating windows ────────────────────────────────────────────

/// Concrete window instances for `court` on `date`, sorted by start.
///
/// Dated rules for the date replace every weekly rule; a closure removes
/// the day entirely. Overlapping rules merge into one window. Two rules
/// that only meet at a boundary stay two windows, and no booking may
/// straddle them.
pub fn windows_on(court: &Court, date: NaiveDate) -> Vec<Span> {
    if court.closures.contains(&date) {
        return Vec::new();
    }

    let dated: Vec<&WindowRule> = court
        .windows
        .iter()
        .filter(|w| matches!(w.on, Recurrence::Dated(d) if d == date))
        .collect();

    let rules = if dated.is_empty() {
        court
            .windows
            .iter()
            .filter(|w| matches!(w.on, Recurrence::Weekly(_)) && w.on.applies_to(date))
            .collect()
    } else {
        dated
    };

    let mut spans: Vec<Span> = rules
        .into_iter()
        .filter_map(|w| instantiate(w, date))
        .collect();
    spans.sort_by_key(|s| s.start);

    let mut merged: Vec<Span> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(last) if span.start < last.end => last.end = last.end.max(span.end),
            _ => merged.push(span),
        }
    }
    merged
}

/// Turn a rule into a dated span. `end == 00:00` closes at the next midnight;
/// any other `end <= start` is not a valid window and yields `None`.
pub fn instantiate(rule: &WindowRule, date: NaiveDate) -> Option<Span> {
    let start = date.and_time(rule.start);
    let end = if rule.end.num_seconds_from_midnight() == 0 {
        date.succ_opt()?.and_time(NaiveTime::MIN)
    } else {
        date.and_time(rule.end)
    };
    (start < end).then(|| Span::new(start, end))
}

/// The window instance active at `t`, if any.
pub fn window_at(windows: &[Span], t: NaiveDateTime) -> Option<Span> {
    windows.iter().copied().find(|w| w.contains_instant(t))
}

/// The single window that fully contains `span`, if any.
pub fn containing_window(windows: &[Span], span: &Span) -> Option<Span> {
    windows.iter().copied().find(|w| w.contains_span(span))
}

/// Resolve the window active on `court` at `t`.
pub fn resolve_window(court: &Court, t: NaiveDateTime) -> Option<Span> {
    window_at(&windows_on(court, t.date()), t)
}

/// Smallest range covering every window, used to bound snapshot queries.
pub fn covering_range(windows: &[Span]) -> Option<Span> {
    let start = windows.iter().map(|w| w.start).min()?;
    let end = windows.iter().map(|w| w.end).max()?;
    Some(Span::new(start, end))
}

// ── Grid ─────────────────────────────────────────────────────────

/// True when `t` sits on the wall-clock grid of `granularity` minutes.
pub fn is_aligned(t: NaiveDateTime, granularity: Minutes) -> bool {
    let secs = i64::from(t.time().num_seconds_from_midnight());
    t.time().nanosecond() == 0 && secs % (granularity * 60) == 0
}

/// First grid point at or after `t`.
pub fn align_up(t: NaiveDateTime, granularity: Minutes) -> NaiveDateTime {
    let step = granularity * 60;
    let secs = i64::from(t.time().num_seconds_from_midnight());
    let floor = t.date().and_time(NaiveTime::MIN) + TimeDelta::seconds(secs - secs % step);
    if floor == t { floor } else { floor + TimeDelta::seconds(step) }
}

#[cfg(test)]
mod tests {
    use chrono::Weekday;
    use ulid::Ulid;

    use super::*;

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    /// Monday.
    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        day().and_time(hm(h, m))
    }

    fn court(windows: Vec<WindowRule>) -> Court {
        Court {
            id: Ulid::new(),
            name: "Pista 1".into(),
            windows,
            closures: vec![],
            max_players: 4,
            has_lighting: false,
            has_heating: false,
            features: vec![],
        }
    }

    fn weekly(day: Weekday, start: NaiveTime, end: NaiveTime) -> WindowRule {
        WindowRule {
            on: Recurrence::Weekly(day),
            start,
            end,
        }
    }

    #[test]
    fn weekly_rule_resolves_on_matching_day() {
        let c = court(vec![
            weekly(Weekday::Mon, hm(8, 0), hm(23, 0)),
            weekly(Weekday::Tue, hm(10, 0), hm(14, 0)),
        ]);
        assert_eq!(windows_on(&c, day()), vec![Span::new(at(8, 0), at(23, 0))]);
    }

    #[test]
    fn dated_override_replaces_weekly() {
        let c = court(vec![
            weekly(Weekday::Mon, hm(8, 0), hm(23, 0)),
            WindowRule {
                on: Recurrence::Dated(day()),
                start: hm(10, 0),
                end: hm(14, 0),
            },
        ]);
        assert_eq!(windows_on(&c, day()), vec![Span::new(at(10, 0), at(14, 0))]);
        // The following Monday is back to the weekly rule.
        let next = day() + TimeDelta::days(7);
        assert_eq!(windows_on(&c, next).len(), 1);
        assert_eq!(windows_on(&c, next)[0].start, next.and_time(hm(8, 0)));
    }

    #[test]
    fn closure_removes_every_window() {
        let mut c = court(vec![weekly(Weekday::Mon, hm(8, 0), hm(23, 0))]);
        c.closures.push(day());
        assert!(windows_on(&c, day()).is_empty());
    }

    #[test]
    fn midnight_end_closes_next_day() {
        let c = court(vec![weekly(Weekday::Mon, hm(18, 0), hm(0, 0))]);
        let windows = windows_on(&c, day());
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].minutes(), 6 * 60);
        assert_eq!(windows[0].end.date(), day().succ_opt().unwrap());
    }

    #[test]
    fn inverted_window_is_dropped() {
        let c = court(vec![weekly(Weekday::Mon, hm(14, 0), hm(9, 0))]);
        assert!(windows_on(&c, day()).is_empty());
    }

    #[test]
    fn split_windows_stay_separate_and_sorted() {
        let c = court(vec![
            weekly(Weekday::Mon, hm(16, 0), hm(22, 0)),
            weekly(Weekday::Mon, hm(8, 0), hm(16, 0)),
        ]);
        let windows = windows_on(&c, day());
        assert_eq!(
            windows,
            vec![Span::new(at(8, 0), at(16, 0)), Span::new(at(16, 0), at(22, 0))]
        );
        // A booking across the seam fits neither window.
        let straddle = Span::new(at(15, 0), at(17, 0));
        assert!(containing_window(&windows, &straddle).is_none());
        let inside = Span::new(at(16, 0), at(17, 0));
        assert_eq!(containing_window(&windows, &inside), Some(windows[1]));
    }

    #[test]
    fn overlapping_rules_merge() {
        let c = court(vec![
            weekly(Weekday::Mon, hm(12, 0), hm(20, 0)),
            weekly(Weekday::Mon, hm(8, 0), hm(14, 0)),
            weekly(Weekday::Mon, hm(20, 0), hm(22, 0)),
        ]);
        let windows = windows_on(&c, day());
        assert_eq!(
            windows,
            vec![Span::new(at(8, 0), at(20, 0)), Span::new(at(20, 0), at(22, 0))]
        );
        let noon = Span::new(at(12, 0), at(13, 0));
        assert_eq!(windows.iter().filter(|w| w.contains_span(&noon)).count(), 1);
    }

    #[test]
    fn resolve_window_at_instant() {
        let c = court(vec![weekly(Weekday::Mon, hm(8, 0), hm(12, 0))]);
        assert_eq!(resolve_window(&c, at(9, 15)), Some(Span::new(at(8, 0), at(12, 0))));
        assert_eq!(resolve_window(&c, at(12, 0)), None); // half-open
        assert_eq!(resolve_window(&c, at(7, 59)), None);
    }

    #[test]
    fn covering_range_spans_all_windows() {
        let windows = vec![Span::new(at(8, 0), at(12, 0)), Span::new(at(16, 0), at(22, 0))];
        assert_eq!(covering_range(&windows), Some(Span::new(at(8, 0), at(22, 0))));
        assert_eq!(covering_range(&[]), None);
    }

    #[test]
    fn grid_alignment() {
        assert!(is_aligned(at(9, 0), 30));
        assert!(is_aligned(at(9, 30), 30));
        assert!(!is_aligned(at(9, 15), 30));
        assert!(is_aligned(at(9, 15), 15));
    }

    #[test]
    fn align_up_rounds_to_next_grid_point() {
        assert_eq!(align_up(at(9, 0), 30), at(9, 0));
        assert_eq!(align_up(at(9, 10), 30), at(9, 30));
        assert_eq!(align_up(at(9, 31), 30), at(10, 0));
        assert_eq!(
            align_up(at(23, 45), 30),
            day().succ_opt().unwrap().and_time(hm(0, 0))
        );
    }
}
