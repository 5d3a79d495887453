use serde_json::json;
use tracing::{info, warn};
use ulid::Ulid;

use crate::model::*;
use crate::notify::{Delivery, MessageKey};
use crate::observability;

use super::slots::check_reservable;
use super::{Engine, EngineError};

impl Engine {
    /// Reserve a seat and create a booking for it, as one atomic step under
    /// the slot's write lock. Reminders are scheduled afterwards and are
    /// advisory: if scheduling fails the booking stands, and the recovery
    /// sweep backfills them.
    pub async fn book(&self, user_id: i64, slot: SlotKey) -> Result<Ulid, EngineError> {
        let rs = self
            .get_slot(&slot)
            .ok_or_else(|| EngineError::SlotNotFound(slot.clone()))?;
        let mut guard = rs.write().await;

        // One active booking per (user, slot).
        for bid in &guard.bookings {
            if let Some(b) = self.bookings.get(bid)
                && b.user_id == user_id
                && b.status.is_active()
            {
                metrics::counter!(observability::BOOKING_CONFLICTS_TOTAL).increment(1);
                return Err(EngineError::DuplicateBooking { user_id, slot });
            }
        }

        if let Err(e) = check_reservable(&guard) {
            metrics::counter!(observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            return Err(e);
        }

        let id = Ulid::new();
        let created_at = now_ms();
        let event = Event::BookingCreated {
            id,
            user_id,
            slot: slot.clone(),
            created_at,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(observability::BOOKINGS_TOTAL).increment(1);

        let start = guard.effective_start();
        if let Err(e) = self.schedule_for(id, start).await {
            // Booking is valid without its reminders; backfill will retry.
            warn!("failed to schedule reminders for booking {id}: {e}");
        }
        drop(guard);

        info!("booking {id} created for user {user_id} at {slot}");
        self.send_notice(
            user_id,
            MessageKey::BookingConfirmed,
            json!({
                "booking_id": id.to_string(),
                "branch": slot.branch,
                "subject": slot.subject,
                "date": slot.date,
                "start": start,
            }),
        );
        Ok(id)
    }

    /// Cancel one booking. Releases the seat exactly once: the second call
    /// for the same booking returns `AlreadyCancelled` and decrements
    /// nothing.
    pub async fn cancel_booking(
        &self,
        booking_id: Ulid,
        actor: CancelActor,
    ) -> Result<(), EngineError> {
        let booking = self
            .bookings
            .get(&booking_id)
            .map(|b| b.clone())
            .ok_or(EngineError::BookingNotFound(booking_id))?;

        let rs = self
            .get_slot(&booking.slot)
            .ok_or_else(|| EngineError::SlotNotFound(booking.slot.clone()))?;
        let mut guard = rs.write().await;

        // Re-check under the lock: a racing cancel may have won.
        match self.bookings.get(&booking_id).map(|b| b.status) {
            Some(status) if status.is_active() => {}
            Some(_) => return Err(EngineError::AlreadyCancelled(booking_id)),
            None => return Err(EngineError::BookingNotFound(booking_id)),
        }

        let event = Event::BookingCancelled { id: booking_id, actor };
        self.persist_and_apply(&mut guard, &event).await?;
        drop(guard);
        metrics::counter!(
            observability::CANCELLATIONS_TOTAL,
            "actor" => match actor {
                CancelActor::User => "user",
                CancelActor::Admin => "admin",
            }
        )
        .increment(1);

        info!("booking {booking_id} cancelled by {actor:?}");
        if actor == CancelActor::Admin {
            self.send_notice(
                booking.user_id,
                MessageKey::BookingCancelled,
                json!({
                    "booking_id": booking_id.to_string(),
                    "branch": booking.slot.branch,
                    "subject": booking.slot.subject,
                    "date": booking.slot.date,
                }),
            );
        }
        Ok(())
    }

    /// Active bookings for a user, nearest lesson first. The ordering is a
    /// user-facing contract, not incidental.
    pub async fn list_active(&self, user_id: i64) -> Vec<BookingInfo> {
        let mine: Vec<Booking> = self
            .bookings
            .iter()
            .filter(|e| e.user_id == user_id && e.status.is_active())
            .map(|e| e.value().clone())
            .collect();

        let mut out = Vec::with_capacity(mine.len());
        for b in mine {
            let start = match self.get_slot(&b.slot) {
                Some(rs) => rs.read().await.effective_start(),
                None => b.slot.start,
            };
            out.push(BookingInfo {
                id: b.id,
                user_id: b.user_id,
                slot: b.slot,
                status: b.status,
                start,
                created_at: b.created_at,
            });
        }
        out.sort_by_key(|b| b.start);
        out
    }

    /// Transition every active booking on `rs` to Cancelled and suppress its
    /// reminders. Runs inside the `SlotCancelled` apply — the registry has
    /// already zeroed the seat count, so no per-booking release happens here.
    pub(super) fn cancel_dependents(&self, rs: &SlotState) {
        for bid in &rs.bookings {
            let mut cancelled = false;
            if let Some(mut b) = self.bookings.get_mut(bid)
                && b.status.is_active()
            {
                b.status = BookingStatus::Cancelled;
                cancelled = true;
            }
            if cancelled {
                self.suppress_reminders(*bid);
            }
        }
    }

    /// Periodic sweep: bookings whose lesson has fully elapsed move to
    /// Completed. Returns how many were completed.
    pub async fn sweep_completed(&self, now: Ms) -> usize {
        let candidates: Vec<(Ulid, SlotKey)> = self
            .bookings
            .iter()
            .filter(|e| e.status.is_active())
            .map(|e| (e.id, e.slot.clone()))
            .collect();

        let mut completed = 0;
        for (bid, slot) in candidates {
            let Some(rs) = self.get_slot(&slot) else { continue };
            let over_at = rs.read().await.effective_start() + self.config.lesson_duration_ms;
            if over_at > now {
                continue;
            }
            match self
                .persist_and_record(&Event::BookingCompleted { id: bid })
                .await
            {
                Ok(()) => completed += 1,
                Err(e) => warn!("completion sweep failed for booking {bid}: {e}"),
            }
        }
        completed
    }

    /// Fire-and-forget notification intent. Failure is logged for
    /// operational visibility and never propagated.
    pub(super) fn send_notice(&self, recipient: i64, key: MessageKey, params: serde_json::Value) {
        if self.notify.deliver(recipient, key, params) == Delivery::Failed {
            metrics::counter!(observability::DELIVERY_FAILURES_TOTAL).increment(1);
            tracing::debug!("no live subscriber for recipient {recipient}, notice {key:?} dropped");
        }
    }
}
