use std::sync::Arc;

use tokio::sync::RwLock;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError, SharedSlotState};

/// Reservation gate, evaluated under the slot's write lock. Only an Open
/// slot with seats left admits a new reservation; the lock held across this
/// check and the subsequent apply is what resolves two callers racing for
/// the last seat to exactly one winner.
pub(super) fn check_reservable(rs: &SlotState) -> Result<(), EngineError> {
    match rs.status {
        SlotStatus::Open => {}
        SlotStatus::Delayed { .. } | SlotStatus::Cancelled => {
            return Err(EngineError::SlotClosed(rs.key.clone()));
        }
    }
    if rs.reserved >= rs.capacity {
        return Err(EngineError::SlotFull { capacity: rs.capacity });
    }
    Ok(())
}

/// Booking ids on this slot that are still Pending/Confirmed — the set a
/// delay or cancellation must propagate to.
pub(super) fn active_booking_ids(engine: &Engine, rs: &SlotState) -> Vec<Ulid> {
    rs.bookings
        .iter()
        .filter(|bid| {
            engine
                .bookings
                .get(bid)
                .is_some_and(|b| b.status.is_active())
        })
        .copied()
        .collect()
}

impl Engine {
    /// Define a bookable slot. Called by the admin panel or a seed process
    /// when the schedule is laid out.
    pub async fn define_slot(&self, slot: SlotKey, capacity: u32) -> Result<(), EngineError> {
        if self.slots.len() >= MAX_SLOTS {
            return Err(EngineError::LimitExceeded("too many slots"));
        }
        if capacity == 0 || capacity > MAX_SLOT_CAPACITY {
            return Err(EngineError::LimitExceeded("capacity out of range"));
        }
        if slot.branch.len() > MAX_NAME_LEN || slot.subject.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("branch or subject name too long"));
        }
        if slot.start < MIN_VALID_TIMESTAMP_MS || slot.start > MAX_VALID_TIMESTAMP_MS {
            return Err(EngineError::LimitExceeded("start timestamp out of range"));
        }
        if self.slots.contains_key(&slot) {
            return Err(EngineError::SlotExists(slot));
        }

        let event = Event::SlotDefined { slot: slot.clone(), capacity };
        self.wal_append(&event).await?;
        self.slots.insert(
            slot.clone(),
            Arc::new(RwLock::new(SlotState::new(slot, capacity))),
        );
        Ok(())
    }

    pub async fn slot_info(&self, key: &SlotKey) -> Option<SlotInfo> {
        let rs = self.get_slot(key)?;
        let guard = rs.read().await;
        Some(SlotInfo {
            key: guard.key.clone(),
            capacity: guard.capacity,
            reserved: guard.reserved,
            status: guard.status,
            effective_start: guard.effective_start(),
        })
    }

    /// Open slots with seats left, for the front end's pickers. Ordered by
    /// effective start ascending.
    pub async fn list_open_slots(&self) -> Vec<SlotInfo> {
        let mut out = Vec::new();
        let arcs: Vec<SharedSlotState> =
            self.slots.iter().map(|e| e.value().clone()).collect();
        for rs in arcs {
            let guard = rs.read().await;
            if guard.status == SlotStatus::Open && guard.reserved < guard.capacity {
                out.push(SlotInfo {
                    key: guard.key.clone(),
                    capacity: guard.capacity,
                    reserved: guard.reserved,
                    status: guard.status,
                    effective_start: guard.effective_start(),
                });
            }
        }
        out.sort_by_key(|s| s.effective_start);
        out
    }
}
