use serde_json::json;
use tracing::{debug, warn};
use ulid::Ulid;

use crate::model::*;
use crate::notify::MessageKey;
use crate::observability;

use super::{Engine, EngineError};

impl Engine {
    /// Create the reminder set for a booking: one per configured
    /// (audience, offset) pair, at fire_at = effective start − offset.
    /// Offsets whose fire time is already in the past are skipped — a
    /// last-minute booking gets no 4-hour reminder.
    pub(super) async fn schedule_for(
        &self,
        booking_id: Ulid,
        effective_start: Ms,
    ) -> Result<(), EngineError> {
        let now = now_ms();
        let specs: Vec<ReminderSpec> = self
            .config
            .offsets
            .iter()
            .filter_map(|o| {
                let fire_at = effective_start - o.lead_ms;
                (fire_at > now).then_some(ReminderSpec {
                    audience: o.audience,
                    offset_ms: o.lead_ms,
                    fire_at,
                })
            })
            .collect();

        // Persist even when empty so the backfill pass knows this booking
        // was handled.
        self.persist_and_record(&Event::RemindersScheduled {
            booking_id,
            reminders: specs,
        })
        .await
    }

    /// Re-derive fire times after a delay. Sent reminders stay untouched —
    /// a delay does not recall an already-delivered reminder.
    pub(super) fn reschedule_unsent(&self, booking_id: Ulid, new_start: Ms) {
        if let Some(mut list) = self.reminders.get_mut(&booking_id) {
            for r in list.iter_mut() {
                if !r.sent && !r.suppressed {
                    r.fire_at = new_start - r.offset_ms;
                }
            }
        }
    }

    /// Mark every unsent reminder for a booking permanently skippable.
    /// Idempotent; used on cancellation.
    pub(super) fn suppress_reminders(&self, booking_id: Ulid) {
        if let Some(mut list) = self.reminders.get_mut(&booking_id) {
            for r in list.iter_mut() {
                if !r.sent {
                    r.suppressed = true;
                }
            }
        }
    }

    /// One scheduler pass: dispatch every due reminder, at most once each.
    /// Returns the number dispatched. Driven only by the periodic scheduler
    /// task, never by user-facing calls.
    pub async fn tick(&self, now: Ms) -> usize {
        let due: Vec<(Ulid, Audience, Ms)> = self
            .reminders
            .iter()
            .flat_map(|entry| {
                let bid = *entry.key();
                entry
                    .value()
                    .iter()
                    .filter(|r| !r.sent && !r.suppressed && r.fire_at <= now)
                    .map(|r| (bid, r.audience, r.offset_ms))
                    .collect::<Vec<_>>()
            })
            .collect();

        let mut dispatched = 0;
        for (bid, audience, offset_ms) in due {
            let Some(booking) = self.bookings.get(&bid).map(|b| b.clone()) else {
                continue;
            };
            if booking.status != BookingStatus::Confirmed {
                continue;
            }

            // A reminder for a lesson that already started is stale, not
            // late: retire it without delivering. Covers the first tick
            // after scheduler downtime.
            let lapsed = match self.get_slot(&booking.slot) {
                Some(rs) => rs.read().await.effective_start() <= now,
                None => true,
            };
            if lapsed {
                self.suppress_reminders(bid);
                continue;
            }

            // Flip the sent flag under the entry's exclusive lock before any
            // dispatch. An overlapping tick that selected the same reminder
            // finds the flag set and skips — no double send.
            let claimed = {
                let Some(mut list) = self.reminders.get_mut(&bid) else { continue };
                match list
                    .iter_mut()
                    .find(|r| r.audience == audience && r.offset_ms == offset_ms)
                {
                    Some(r) if !r.sent && !r.suppressed && r.fire_at <= now => {
                        r.sent = true;
                        true
                    }
                    _ => false,
                }
            };
            if !claimed {
                continue;
            }

            if let Err(e) = self
                .wal_append(&Event::ReminderSent { booking_id: bid, audience, offset_ms })
                .await
            {
                warn!("failed to persist sent marker for booking {bid}: {e}");
            }

            // Delivery is at-most-once: failures are logged, the reminder
            // stays marked sent either way.
            self.dispatch_reminder(&booking, audience);
            metrics::counter!(observability::REMINDERS_SENT_TOTAL).increment(1);
            dispatched += 1;
        }
        dispatched
    }

    fn dispatch_reminder(&self, booking: &Booking, audience: Audience) {
        let params = json!({
            "booking_id": booking.id.to_string(),
            "branch": booking.slot.branch,
            "subject": booking.slot.subject,
            "date": booking.slot.date,
            "student_id": booking.user_id,
            "timezone": self.config.timezone,
        });
        match audience {
            Audience::Student => {
                self.send_notice(booking.user_id, MessageKey::ReminderStudent, params);
            }
            Audience::Teacher => {
                for admin in &self.config.admin_ids {
                    self.send_notice(*admin, MessageKey::ReminderTeacher, params.clone());
                }
            }
        }
    }

    /// Recovery pass: Confirmed bookings with no reminder record get one.
    /// Covers the window where reservation succeeded but reminder creation
    /// failed.
    pub async fn backfill_reminders(&self, now: Ms) -> usize {
        let missing: Vec<(Ulid, SlotKey)> = self
            .bookings
            .iter()
            .filter(|e| e.status == BookingStatus::Confirmed && !self.reminders.contains_key(&e.id))
            .map(|e| (e.id, e.slot.clone()))
            .collect();

        let mut backfilled = 0;
        for (bid, slot) in missing {
            let Some(rs) = self.get_slot(&slot) else { continue };
            let start = rs.read().await.effective_start();
            if start <= now {
                continue; // lesson already started, sweep will complete it
            }
            match self.schedule_for(bid, start).await {
                Ok(()) => {
                    debug!("backfilled reminders for booking {bid}");
                    backfilled += 1;
                }
                Err(e) => warn!("reminder backfill failed for booking {bid}: {e}"),
            }
        }
        backfilled
    }
}
