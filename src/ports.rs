use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::engine::{EngineError, Rate};
use crate::model::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// An active reservation already overlaps the requested span.
    Conflict(ReservationId),
    /// Transient: the backing store could not serve the call.
    Unavailable(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Conflict(id) => write!(f, "conflicts with reservation {id}"),
            StoreError::Unavailable(e) => write!(f, "store unavailable: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    Cancelled,
    AlreadyCancelled,
    NotFound,
}

/// Persistence boundary for reservations.
///
/// `insert_reservation_if_free` must be conditionally atomic per court: the
/// overlap check against non-cancelled reservations and the insert happen in
/// one critical section, so two racing writers cannot both succeed.
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    /// Every reservation of `court_id` overlapping `range`, cancelled ones
    /// included, sorted by start.
    async fn list_reservations(&self, court_id: CourtId, range: Span) -> Result<Vec<Reservation>, StoreError>;

    async fn insert_reservation_if_free(&self, reservation: Reservation) -> Result<Reservation, StoreError>;

    /// Idempotent: a second cancel reports `AlreadyCancelled` and changes nothing.
    async fn cancel_reservation(&self, id: ReservationId) -> Result<CancelOutcome, StoreError>;

    async fn get_reservation(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError>;
}

/// Concrete operating windows for a court on a date, dated overrides applied.
pub trait ScheduleSource: Send + Sync {
    fn operating_windows(&self, court_id: CourtId, date: NaiveDate) -> Result<Vec<Span>, EngineError>;
}

pub trait RateSource: Send + Sync {
    /// `Ok(None)` when no bracket or promotion covers `at`.
    fn rate(&self, court_id: CourtId, at: NaiveDateTime) -> Result<Option<Rate>, EngineError>;
}

pub trait CourtDirectory: Send + Sync {
    fn court(&self, court_id: CourtId) -> Option<Court>;
    fn court_ids(&self) -> Vec<CourtId>;
}
