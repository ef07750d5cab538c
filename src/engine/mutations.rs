use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::{error_label, BOOKINGS_TOTAL, BOOKING_FAILURES_TOTAL, CANCELLATIONS_TOTAL};
use crate::ports::CancelOutcome;

use super::{Engine, EngineError};

impl Engine {
    /// Validate, price, then insert conditionally. Losing a race to another
    /// writer surfaces as `Rejected(Occupied)`, the same as a conflict seen
    /// during validation; callers re-query and retry.
    pub async fn book(
        &self,
        candidate: &Candidate,
        status: ReservationStatus,
        label: Option<String>,
    ) -> Result<Reservation, EngineError> {
        self.try_book(candidate, status, label).await.inspect_err(|e| {
            metrics::counter!(BOOKING_FAILURES_TOTAL, "outcome" => error_label(e)).increment(1);
        })
    }

    async fn try_book(
        &self,
        candidate: &Candidate,
        status: ReservationStatus,
        label: Option<String>,
    ) -> Result<Reservation, EngineError> {
        if status == ReservationStatus::Cancelled {
            return Err(EngineError::InvalidStatus(status));
        }
        if let Some(ref l) = label
            && l.len() > MAX_LABEL_LEN
        {
            return Err(EngineError::LimitExceeded("label too long"));
        }

        self.validate(candidate).await?;
        let quote = self.quote(candidate)?;

        let reservation = Reservation {
            id: Ulid::new(),
            court_id: candidate.court_id,
            start: candidate.start,
            duration_minutes: candidate.duration_minutes,
            status,
            addons: candidate.addons,
            price_owed: quote.total,
            label,
        };
        let reservation = self
            .store_call("insert_reservation_if_free", self.store.insert_reservation_if_free(reservation))
            .await
            .inspect_err(|e| debug!("insert for court {} lost: {e}", candidate.court_id))?;

        metrics::counter!(BOOKINGS_TOTAL).increment(1);
        info!(
            "booked {} on court {} at {} for {} min ({} cents)",
            reservation.id, reservation.court_id, reservation.start, reservation.duration_minutes, reservation.price_owed
        );
        Ok(reservation)
    }

    /// Idempotent. `NotFound` is an outcome, not an error.
    pub async fn cancel(&self, id: ReservationId) -> Result<CancelOutcome, EngineError> {
        let outcome = self
            .store_call("cancel_reservation", self.store.cancel_reservation(id))
            .await
            .inspect_err(|e| {
                metrics::counter!(CANCELLATIONS_TOTAL, "outcome" => error_label(e)).increment(1);
            })?;
        let label = match outcome {
            CancelOutcome::Cancelled => "cancelled",
            CancelOutcome::AlreadyCancelled => "already_cancelled",
            CancelOutcome::NotFound => "not_found",
        };
        metrics::counter!(CANCELLATIONS_TOTAL, "outcome" => label).increment(1);
        if outcome == CancelOutcome::Cancelled {
            info!("cancelled {id}");
        }
        Ok(outcome)
    }
}
