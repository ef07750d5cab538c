mod conflict;
mod day;
mod error;
mod holes;
mod mutations;
mod pricing;
mod queries;
mod schedule;
mod slots;

pub use conflict::{check_no_conflict, Occupancy};
pub use day::CourtDay;
pub use error::{DurationFault, EngineError, Rejection};
pub use holes::{
    classify, count_holes, is_hole, is_newly_created_hole, is_preexisting_hole, GapClass, GapGauge, Side,
};
pub use pricing::{prorate, quote, AddonCharge, AddonFees, Promotion, Quote, Rate, RateBracket, RateTable};
pub use schedule::{
    align_up, containing_window, covering_range, instantiate, is_aligned, resolve_window, window_at, windows_on,
};
pub use slots::{candidate_starts, enumerate, Availability, CourtAvailability, SlotRow, TimeSlot};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::warn;

use crate::limits::*;
use crate::model::*;
use crate::observability::STORE_TIMEOUTS_TOTAL;
use crate::ports::{CourtDirectory, RateSource, ReservationRepository, ScheduleSource, StoreError};

/// Answer to "could this candidate be booked right now?".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub bookable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<Rejection>,
}

impl Verdict {
    pub const BOOKABLE: Verdict = Verdict {
        bookable: true,
        reason: None,
    };

    pub fn rejected(reason: Rejection) -> Self {
        Self {
            bookable: false,
            reason: Some(reason),
        }
    }
}

/// Duration and start-time rules of the club grid, in reporting order.
pub fn check_grid(policy: &BookingPolicy, candidate: &Candidate) -> Result<(), Rejection> {
    let minutes = candidate.duration_minutes;
    let granularity = policy.granularity;
    if minutes == 0 || Minutes::from(minutes) % granularity != 0 {
        return Err(Rejection::InvalidDuration(DurationFault::NotGranular { minutes, granularity }));
    }
    if !policy.durations.contains(&minutes) {
        return Err(Rejection::InvalidDuration(DurationFault::NotOffered { minutes }));
    }
    if !is_aligned(candidate.start, granularity) {
        return Err(Rejection::InvalidDuration(DurationFault::MisalignedStart {
            start: candidate.start.time(),
            granularity,
        }));
    }
    Ok(())
}

/// Refuse policies the validators cannot honour.
pub fn validate_policy(policy: &BookingPolicy) -> Result<(), EngineError> {
    let g = policy.granularity;
    if g <= 0 || (24 * 60) % g != 0 {
        return Err(EngineError::InvalidConfig(format!(
            "granularity {g} must be positive and divide a day"
        )));
    }
    if policy.durations.is_empty() {
        return Err(EngineError::InvalidConfig("no offered durations".into()));
    }
    if policy.durations.len() > MAX_OFFERED_DURATIONS {
        return Err(EngineError::LimitExceeded("too many offered durations"));
    }
    for d in &policy.durations {
        if *d == 0 || *d > MAX_DURATION_MINUTES || Minutes::from(*d) % g != 0 {
            return Err(EngineError::InvalidConfig(format!(
                "offered duration {d} is not a positive multiple of {g} up to {MAX_DURATION_MINUTES}"
            )));
        }
    }
    Ok(())
}

/// Allocation engine for one facility.
///
/// Validation runs on point-in-time snapshots taken through the repository;
/// the only synchronisation point is the store's conditional insert.
pub struct Engine {
    courts: Arc<dyn CourtDirectory>,
    schedule: Arc<dyn ScheduleSource>,
    rates: Arc<dyn RateSource>,
    store: Arc<dyn ReservationRepository>,
    policy: BookingPolicy,
    fees: AddonFees,
    store_timeout: Duration,
}

impl Engine {
    pub fn new(
        courts: Arc<dyn CourtDirectory>,
        schedule: Arc<dyn ScheduleSource>,
        rates: Arc<dyn RateSource>,
        store: Arc<dyn ReservationRepository>,
        policy: BookingPolicy,
        fees: AddonFees,
    ) -> Result<Self, EngineError> {
        validate_policy(&policy)?;
        Ok(Self {
            courts,
            schedule,
            rates,
            store,
            policy,
            fees,
            store_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
        })
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn policy(&self) -> &BookingPolicy {
        &self.policy
    }

    pub fn fees(&self) -> &AddonFees {
        &self.fees
    }

    /// Bound a store call by the timeout and map store failures.
    /// A conflict is a definitive rejection; anything else is retryable.
    pub(super) async fn store_call<T>(
        &self,
        op: &'static str,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, EngineError> {
        match tokio::time::timeout(self.store_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(StoreError::Conflict(by))) => Err(Rejection::Occupied { by }.into()),
            Ok(Err(StoreError::Unavailable(e))) => {
                warn!("{op}: store unavailable: {e}");
                Err(EngineError::Retryable(format!("{op}: {e}")))
            }
            Err(_) => {
                metrics::counter!(STORE_TIMEOUTS_TOTAL, "op" => op).increment(1);
                warn!("{op}: store did not answer within {:?}", self.store_timeout);
                Err(EngineError::Retryable(format!(
                    "{op} timed out after {}ms",
                    self.store_timeout.as_millis()
                )))
            }
        }
    }

    pub(super) fn court_or_reject(&self, court_id: CourtId) -> Result<Court, EngineError> {
        self.courts
            .court(court_id)
            .ok_or_else(|| Rejection::UnknownCourt { court_id }.into())
    }

    /// Windows plus active occupancy of one court for one date.
    pub async fn snapshot(&self, court_id: CourtId, date: NaiveDate) -> Result<CourtDay, EngineError> {
        let windows = self.schedule.operating_windows(court_id, date)?;
        let reservations = match covering_range(&windows) {
            Some(range) => {
                self.store_call("list_reservations", self.store.list_reservations(court_id, range))
                    .await?
            }
            None => Vec::new(),
        };
        Ok(CourtDay::new(court_id, date, windows, &reservations))
    }
}
