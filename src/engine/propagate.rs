use serde_json::json;
use tracing::info;
use ulid::Ulid;

use crate::limits::{MAX_VALID_TIMESTAMP_MS, MIN_VALID_TIMESTAMP_MS};
use crate::model::*;
use crate::notify::MessageKey;
use crate::observability;

use super::slots::active_booking_ids;
use super::{Engine, EngineError};

impl Engine {
    /// Delay a slot to a new start time. One persisted event carries the
    /// whole propagation: the slot status, every active booking's reminder
    /// times, all re-derived in the same apply. Returns the affected
    /// booking ids. Sent reminders are not recalled.
    pub async fn delay_slot(
        &self,
        slot: &SlotKey,
        new_start: Ms,
    ) -> Result<Vec<Ulid>, EngineError> {
        if new_start < MIN_VALID_TIMESTAMP_MS || new_start > MAX_VALID_TIMESTAMP_MS {
            return Err(EngineError::LimitExceeded("new start timestamp out of range"));
        }
        let rs = self
            .get_slot(slot)
            .ok_or_else(|| EngineError::SlotNotFound(slot.clone()))?;
        let mut guard = rs.write().await;
        if guard.status == SlotStatus::Cancelled {
            return Err(EngineError::SlotAlreadyCancelled(slot.clone()));
        }

        let affected = active_booking_ids(self, &guard);
        let event = Event::SlotDelayed {
            slot: slot.clone(),
            new_start,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        drop(guard);
        metrics::counter!(observability::SLOT_MUTATIONS_TOTAL, "kind" => "delay").increment(1);

        info!(
            "slot {slot} delayed to {new_start}, {} bookings affected",
            affected.len()
        );
        for bid in &affected {
            if let Some(b) = self.bookings.get(bid).map(|b| b.clone()) {
                self.send_notice(
                    b.user_id,
                    MessageKey::LessonDelayed,
                    json!({
                        "booking_id": bid.to_string(),
                        "branch": slot.branch,
                        "subject": slot.subject,
                        "date": slot.date,
                        "new_start": new_start,
                    }),
                );
            }
        }
        Ok(affected)
    }

    /// Cancel a slot and everything on it. Idempotent: cancelling an
    /// already-cancelled slot succeeds with an empty affected list, so a
    /// retried admin command is harmless.
    pub async fn cancel_slot(&self, slot: &SlotKey) -> Result<Vec<Ulid>, EngineError> {
        let rs = self
            .get_slot(slot)
            .ok_or_else(|| EngineError::SlotNotFound(slot.clone()))?;
        let mut guard = rs.write().await;
        if guard.status == SlotStatus::Cancelled {
            return Ok(Vec::new());
        }

        let affected = active_booking_ids(self, &guard);
        let event = Event::SlotCancelled { slot: slot.clone() };
        self.persist_and_apply(&mut guard, &event).await?;
        drop(guard);
        metrics::counter!(observability::SLOT_MUTATIONS_TOTAL, "kind" => "cancel").increment(1);

        info!(
            "slot {slot} cancelled, {} bookings released",
            affected.len()
        );
        for bid in &affected {
            if let Some(b) = self.bookings.get(bid).map(|b| b.clone()) {
                self.send_notice(
                    b.user_id,
                    MessageKey::LessonCancelled,
                    json!({
                        "booking_id": bid.to_string(),
                        "branch": slot.branch,
                        "subject": slot.subject,
                        "date": slot.date,
                    }),
                );
            }
        }
        Ok(affected)
    }
}
