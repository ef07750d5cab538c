use chrono::{NaiveDateTime, NaiveTime};
use serde::Serialize;
use ulid::Ulid;

use crate::model::*;

use super::holes::Side;

/// Why a duration or start time is not acceptable on the club's grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "fault")]
pub enum DurationFault {
    NotOffered { minutes: u32 },
    /// Zero, or not a whole multiple of the granularity.
    NotGranular { minutes: u32, granularity: Minutes },
    MisalignedStart { start: NaiveTime, granularity: Minutes },
}

/// A typed, deterministic reason a candidate cannot be booked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Rejection {
    OutOfSchedule,
    Occupied { by: ReservationId },
    WouldCreateHole { side: Side, gap_minutes: Minutes },
    UnknownCourt { court_id: CourtId },
    UnsupportedAddon { addon: Addon },
    InvalidDuration(DurationFault),
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::OutOfSchedule => write!(f, "not inside a single operating window"),
            Rejection::Occupied { by } => write!(f, "overlaps reservation {by}"),
            Rejection::WouldCreateHole { side, gap_minutes } => {
                write!(f, "would leave an unbookable {gap_minutes}-minute gap {side}")
            }
            Rejection::UnknownCourt { court_id } => write!(f, "unknown court: {court_id}"),
            Rejection::UnsupportedAddon { addon } => write!(f, "court has no {addon}"),
            Rejection::InvalidDuration(DurationFault::NotOffered { minutes }) => {
                write!(f, "{minutes}-minute bookings are not offered")
            }
            Rejection::InvalidDuration(DurationFault::NotGranular { minutes, granularity }) => {
                write!(f, "{minutes} minutes is not a multiple of {granularity}")
            }
            Rejection::InvalidDuration(DurationFault::MisalignedStart { start, granularity }) => {
                write!(f, "start {start} is not on the {granularity}-minute grid")
            }
        }
    }
}

#[derive(Debug)]
pub enum EngineError {
    Rejected(Rejection),
    NotFound(Ulid),
    Unsupported(Addon),
    Unpriced {
        court_id: CourtId,
        at: NaiveDateTime,
    },
    InvalidStatus(ReservationStatus),
    /// Transient store failure or timeout. Safe to retry after re-querying.
    Retryable(String),
    LimitExceeded(&'static str),
    InvalidConfig(String),
    WalError(String),
}

impl EngineError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Retryable(_))
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            EngineError::Rejected(r) => Some(r),
            _ => None,
        }
    }
}

impl From<Rejection> for EngineError {
    fn from(r: Rejection) -> Self {
        EngineError::Rejected(r)
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Rejected(r) => write!(f, "rejected: {r}"),
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::Unsupported(addon) => write!(f, "unsupported add-on: {addon}"),
            EngineError::Unpriced { court_id, at } => {
                write!(f, "no rate for court {court_id} at {at}")
            }
            EngineError::InvalidStatus(status) => {
                write!(f, "cannot create a reservation as {status:?}")
            }
            EngineError::Retryable(e) => write!(f, "store unavailable, retry: {e}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::InvalidConfig(msg) => write!(f, "invalid facility config: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
