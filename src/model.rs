use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Weekday};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Whole minutes: durations, gaps, granularity.
pub type Minutes = i64;

/// Integer cents.
pub type Cents = i64;

pub type CourtId = Ulid;
pub type ReservationId = Ulid;

/// Half-open interval `[start, end)` of facility-local wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Span {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn from_start(start: NaiveDateTime, minutes: Minutes) -> Self {
        Self::new(start, start + TimeDelta::minutes(minutes))
    }

    pub fn minutes(&self) -> Minutes {
        (self.end - self.start).num_minutes()
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: NaiveDateTime) -> bool {
        self.start <= t && t < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

// ── Courts ───────────────────────────────────────────────────────

/// Which dates a window rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recurrence {
    Weekly(Weekday),
    /// Replaces every weekly rule on that date.
    Dated(NaiveDate),
}

impl Recurrence {
    pub fn applies_to(&self, date: NaiveDate) -> bool {
        use chrono::Datelike;
        match self {
            Recurrence::Weekly(day) => date.weekday() == *day,
            Recurrence::Dated(d) => *d == date,
        }
    }
}

/// A recurring or date-specific operating window. An `end` of `00:00:00`
/// means midnight at the close of the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowRule {
    pub on: Recurrence,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Addon {
    Lighting,
    Heating,
}

impl std::fmt::Display for Addon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Addon::Lighting => f.write_str("lighting"),
            Addon::Heating => f.write_str("heating"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Addons {
    #[serde(default)]
    pub lighting: bool,
    #[serde(default)]
    pub heating: bool,
}

impl Addons {
    pub const NONE: Addons = Addons {
        lighting: false,
        heating: false,
    };

    pub fn enabled(&self) -> impl Iterator<Item = Addon> + use<> {
        let lighting = self.lighting.then_some(Addon::Lighting);
        let heating = self.heating.then_some(Addon::Heating);
        lighting.into_iter().chain(heating)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Court {
    pub id: CourtId,
    pub name: String,
    pub windows: Vec<WindowRule>,
    /// Dates with no operating window at all.
    #[serde(default)]
    pub closures: Vec<NaiveDate>,
    pub max_players: u32,
    #[serde(default)]
    pub has_lighting: bool,
    #[serde(default)]
    pub has_heating: bool,
    #[serde(default)]
    pub features: Vec<String>,
}

impl Court {
    pub fn supports(&self, addon: Addon) -> bool {
        match addon {
            Addon::Lighting => self.has_lighting,
            Addon::Heating => self.has_heating,
        }
    }

    /// First requested add-on this court cannot provide.
    pub fn first_unsupported(&self, addons: &Addons) -> Option<Addon> {
        addons.enabled().find(|a| !self.supports(*a))
    }
}

// ── Reservations ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    /// Terminal.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub court_id: CourtId,
    pub start: NaiveDateTime,
    pub duration_minutes: u32,
    pub status: ReservationStatus,
    pub addons: Addons,
    pub price_owed: Cents,
    pub label: Option<String>,
}

impl Reservation {
    pub fn span(&self) -> Span {
        Span::from_start(self.start, Minutes::from(self.duration_minutes))
    }

    /// Cancelled reservations are kept for history but occupy nothing.
    pub fn is_active(&self) -> bool {
        self.status != ReservationStatus::Cancelled
    }
}

/// A proposed, not-yet-committed reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub court_id: CourtId,
    pub start: NaiveDateTime,
    pub duration_minutes: u32,
    #[serde(default)]
    pub addons: Addons,
}

impl Candidate {
    pub fn new(court_id: CourtId, start: NaiveDateTime, duration_minutes: u32) -> Self {
        Self {
            court_id,
            start,
            duration_minutes,
            addons: Addons::NONE,
        }
    }

    pub fn with_addons(mut self, addons: Addons) -> Self {
        self.addons = addons;
        self
    }

    pub fn span(&self) -> Span {
        Span::from_start(self.start, Minutes::from(self.duration_minutes))
    }
}

/// Club-wide booking rules: the grid and the durations on offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingPolicy {
    pub granularity: Minutes,
    /// In the order the club presents them.
    pub durations: Vec<u32>,
}

/// Store events: the WAL record and the change-feed payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ReservationPlaced { reservation: Reservation },
    ReservationCancelled { id: ReservationId, court_id: CourtId },
}

impl Event {
    pub fn court_id(&self) -> CourtId {
        match self {
            Event::ReservationPlaced { reservation } => reservation.court_id,
            Event::ReservationCancelled { court_id, .. } => *court_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn span_basics() {
        let s = Span::new(at(9, 0), at(10, 30));
        assert_eq!(s.minutes(), 90);
        assert!(s.contains_instant(at(9, 0)));
        assert!(s.contains_instant(at(10, 29)));
        assert!(!s.contains_instant(at(10, 30))); // half-open
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(at(9, 0), at(10, 0));
        let b = Span::new(at(9, 30), at(10, 30));
        let c = Span::new(at(10, 0), at(11, 0));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
    }

    #[test]
    fn span_contains_span() {
        let outer = Span::new(at(8, 0), at(12, 0));
        let inner = Span::new(at(9, 0), at(10, 0));
        let partial = Span::new(at(7, 0), at(9, 0));
        assert!(outer.contains_span(&inner));
        assert!(outer.contains_span(&outer));
        assert!(!outer.contains_span(&partial));
    }

    #[test]
    fn recurrence_matching() {
        let monday = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        assert!(Recurrence::Weekly(Weekday::Mon).applies_to(monday));
        assert!(!Recurrence::Weekly(Weekday::Tue).applies_to(monday));
        assert!(Recurrence::Dated(monday).applies_to(monday));
        assert!(!Recurrence::Dated(monday.succ_opt().unwrap()).applies_to(monday));
    }

    #[test]
    fn addons_enabled_in_order() {
        let both = Addons {
            lighting: true,
            heating: true,
        };
        assert_eq!(both.enabled().collect::<Vec<_>>(), vec![Addon::Lighting, Addon::Heating]);
        assert_eq!(Addons::NONE.enabled().count(), 0);
    }

    #[test]
    fn court_first_unsupported() {
        let court = Court {
            id: Ulid::new(),
            name: "Pista 1".into(),
            windows: vec![],
            closures: vec![],
            max_players: 4,
            has_lighting: true,
            has_heating: false,
            features: vec![],
        };
        let wants = Addons {
            lighting: true,
            heating: true,
        };
        assert_eq!(court.first_unsupported(&wants), Some(Addon::Heating));
        assert_eq!(court.first_unsupported(&Addons::NONE), None);
    }

    #[test]
    fn cancelled_reservation_is_inactive() {
        let mut r = Reservation {
            id: Ulid::new(),
            court_id: Ulid::new(),
            start: at(9, 0),
            duration_minutes: 60,
            status: ReservationStatus::Confirmed,
            addons: Addons::NONE,
            price_owed: 2000,
            label: None,
        };
        assert!(r.is_active());
        assert_eq!(r.span(), Span::new(at(9, 0), at(10, 0)));
        r.status = ReservationStatus::Cancelled;
        assert!(!r.is_active());
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::ReservationCancelled {
            id: Ulid::new(),
            court_id: Ulid::new(),
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
