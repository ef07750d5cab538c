use std::time::Instant;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use futures::future::try_join_all;
use tracing::debug;

use crate::limits::*;
use crate::model::*;
use crate::observability::{rejection_label, CHECKS_TOTAL, ENUMERATE_DURATION_SECONDS};

use super::{
    check_grid, enumerate, quote, Availability, CourtDay, DurationFault, Engine, EngineError, Quote, Rejection, Verdict,
};

impl Engine {
    /// Court, grid, add-ons, then the snapshot rules: schedule, conflict, holes.
    /// Returns the court and the snapshot the candidate passed against.
    pub(super) async fn validate(&self, candidate: &Candidate) -> Result<(Court, CourtDay), EngineError> {
        let court = self.court_or_reject(candidate.court_id)?;
        check_grid(&self.policy, candidate)?;
        if let Some(addon) = court.first_unsupported(&candidate.addons) {
            return Err(Rejection::UnsupportedAddon { addon }.into());
        }
        let day = self.snapshot(candidate.court_id, candidate.start.date()).await?;
        day.assess(&candidate.span(), self.policy.granularity)?;
        Ok((court, day))
    }

    /// Deterministic for a given store snapshot. `Err` only for failures that
    /// are not rejections (store timeouts, bad configuration).
    pub async fn check_candidate(&self, candidate: &Candidate) -> Result<Verdict, EngineError> {
        let verdict = match self.validate(candidate).await {
            Ok(_) => Verdict::BOOKABLE,
            Err(EngineError::Rejected(reason)) => {
                debug!("candidate {} at {} rejected: {reason}", candidate.court_id, candidate.start);
                Verdict::rejected(reason)
            }
            Err(e) => return Err(e),
        };
        metrics::counter!(CHECKS_TOTAL, "outcome" => rejection_label(verdict.reason.as_ref())).increment(1);
        Ok(verdict)
    }

    /// Availability for `date`. Empty `courts` means every court of the
    /// facility; `durations = None` means the offered set. Starts at or before
    /// `now` are left out.
    pub async fn enumerate_slots(
        &self,
        date: NaiveDate,
        courts: &[CourtId],
        durations: Option<&[u32]>,
        now: Option<NaiveDateTime>,
    ) -> Result<Availability, EngineError> {
        let started = Instant::now();

        let court_ids = if courts.is_empty() {
            self.courts.court_ids()
        } else {
            courts.to_vec()
        };
        if court_ids.len() > MAX_COURTS_PER_QUERY {
            return Err(EngineError::LimitExceeded("too many courts in one query"));
        }
        for court_id in &court_ids {
            self.court_or_reject(*court_id)?;
        }

        let durations = match durations {
            Some(list) => {
                if let Some(bad) = list.iter().find(|d| !self.policy.durations.contains(*d)) {
                    return Err(Rejection::InvalidDuration(DurationFault::NotOffered { minutes: *bad }).into());
                }
                list.to_vec()
            }
            None => self.policy.durations.clone(),
        };

        let days = try_join_all(court_ids.iter().map(|id| self.snapshot(*id, date))).await?;
        let availability = enumerate(date, &days, &durations, self.policy.granularity, now);

        metrics::histogram!(ENUMERATE_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        debug!(
            "enumerated {} courts on {date}: {} of {} starts open",
            days.len(),
            availability.slots.iter().filter(|s| s.available).count(),
            availability.slots.len()
        );
        Ok(availability)
    }

    /// Price a candidate. Independent of availability: an occupied slot
    /// still has a price. Grid rules still apply.
    pub fn quote(&self, candidate: &Candidate) -> Result<Quote, EngineError> {
        let court = self
            .courts
            .court(candidate.court_id)
            .ok_or(EngineError::NotFound(candidate.court_id))?;
        check_grid(&self.policy, candidate)?;
        let rate = self
            .rates
            .rate(court.id, candidate.start)?
            .ok_or(EngineError::Unpriced {
                court_id: court.id,
                at: candidate.start,
            })?;
        quote(&court, candidate, rate, &self.fees)
    }

    /// Every reservation touching `date` on `court_id`, cancelled ones included.
    pub async fn reservations_on(&self, court_id: CourtId, date: NaiveDate) -> Result<Vec<Reservation>, EngineError> {
        if self.courts.court(court_id).is_none() {
            return Err(EngineError::NotFound(court_id));
        }
        let start = date.and_time(NaiveTime::MIN);
        let range = Span::new(start, start + TimeDelta::days(1));
        self.store_call("list_reservations", self.store.list_reservations(court_id, range))
            .await
    }

    pub async fn get_reservation(&self, id: ReservationId) -> Result<Reservation, EngineError> {
        self.store_call("get_reservation", self.store.get_reservation(id))
            .await?
            .ok_or(EngineError::NotFound(id))
    }

    /// Unsellable sub-granularity gaps on `court_id` for `date`.
    pub async fn hole_count(&self, court_id: CourtId, date: NaiveDate) -> Result<usize, EngineError> {
        self.court_or_reject(court_id)?;
        let day = self.snapshot(court_id, date).await?;
        Ok(day.hole_count(self.policy.granularity))
    }
}
