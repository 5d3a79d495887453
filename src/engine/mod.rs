mod bookings;
mod error;
mod propagate;
mod reminders;
mod slots;
#[cfg(test)]
mod tests;

pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::config::EngineConfig;
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedSlotState = Arc<RwLock<SlotState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The booking and scheduling engine: slot registry, booking lifecycle,
/// reminder schedule, and the WAL that makes all three crash-tolerant.
///
/// State mutation goes through exactly one path: build an [`Event`], append
/// it to the WAL, apply it. Replay on startup walks the same apply code, so
/// a restart cannot disagree with the live process.
pub struct Engine {
    pub(super) slots: DashMap<SlotKey, SharedSlotState>,
    pub(super) bookings: DashMap<Ulid, Booking>,
    /// Reminders keyed by booking id; identity inside the vec is
    /// (audience, offset_ms).
    pub(super) reminders: DashMap<Ulid, Vec<Reminder>>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    pub config: EngineConfig,
}

impl Engine {
    pub fn new(
        wal_path: PathBuf,
        notify: Arc<NotifyHub>,
        config: EngineConfig,
    ) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            slots: DashMap::new(),
            bookings: DashMap::new(),
            reminders: DashMap::new(),
            wal_tx,
            notify,
            config,
        };

        // Replay — we're the sole owner of these Arcs, so try_write always
        // succeeds instantly (no contention). Never use blocking_write here
        // because this may run inside an async context.
        for event in &events {
            match event {
                Event::SlotDefined { slot, capacity } => {
                    engine
                        .slots
                        .entry(slot.clone())
                        .or_insert_with(|| {
                            Arc::new(RwLock::new(SlotState::new(slot.clone(), *capacity)))
                        });
                }
                Event::SlotDelayed { slot, .. }
                | Event::SlotCancelled { slot }
                | Event::BookingCreated { slot, .. } => {
                    if let Some(entry) = engine.slots.get(slot) {
                        let rs_arc = entry.value().clone();
                        drop(entry);
                        let mut guard = rs_arc.try_write().expect("replay: uncontended write");
                        engine.apply_slot_event(&mut guard, event);
                    }
                }
                Event::BookingCancelled { id, .. } => {
                    let slot = engine.bookings.get(id).map(|b| b.slot.clone());
                    if let Some(slot) = slot
                        && let Some(entry) = engine.slots.get(&slot)
                    {
                        let rs_arc = entry.value().clone();
                        drop(entry);
                        let mut guard = rs_arc.try_write().expect("replay: uncontended write");
                        engine.apply_slot_event(&mut guard, event);
                    }
                }
                Event::BookingCompleted { .. }
                | Event::RemindersScheduled { .. }
                | Event::ReminderSent { .. } => {
                    engine.apply_record_event(event);
                }
            }
        }

        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn get_slot(&self, key: &SlotKey) -> Option<SharedSlotState> {
        self.slots.get(key).map(|e| e.value().clone())
    }

    /// WAL-append then apply, for events scoped to one slot — the caller
    /// holds that slot's write lock, which is what makes check + append +
    /// apply one atomic step against concurrent callers.
    pub(super) async fn persist_and_apply(
        &self,
        rs: &mut SlotState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.apply_slot_event(rs, event);
        Ok(())
    }

    /// WAL-append then apply, for events that touch only per-entity records
    /// (booking completion, reminder bookkeeping). No slot lock involved.
    pub(super) async fn persist_and_record(&self, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.apply_record_event(event);
        Ok(())
    }

    /// Apply a slot-scoped event. Infallible by construction: events reach
    /// this point only after validation (live path) or from a WAL that
    /// recorded a previously valid transition (replay).
    pub(super) fn apply_slot_event(&self, rs: &mut SlotState, event: &Event) {
        match event {
            Event::BookingCreated { id, user_id, slot, created_at } => {
                rs.reserve();
                rs.bookings.push(*id);
                self.bookings.insert(
                    *id,
                    Booking {
                        id: *id,
                        user_id: *user_id,
                        slot: slot.clone(),
                        status: BookingStatus::Confirmed,
                        created_at: *created_at,
                    },
                );
            }
            Event::BookingCancelled { id, .. } => {
                // The active check is the exactly-once guard: a booking
                // already terminal releases nothing.
                let mut released = false;
                if let Some(mut b) = self.bookings.get_mut(id)
                    && b.status.is_active()
                {
                    b.status = BookingStatus::Cancelled;
                    released = true;
                }
                if released {
                    rs.release();
                    self.suppress_reminders(*id);
                }
            }
            Event::SlotDelayed { new_start, .. } => {
                rs.status = SlotStatus::Delayed { new_start: *new_start };
                for bid in &rs.bookings {
                    if self
                        .bookings
                        .get(bid)
                        .is_some_and(|b| b.status.is_active())
                    {
                        self.reschedule_unsent(*bid, *new_start);
                    }
                }
            }
            Event::SlotCancelled { .. } => {
                if rs.status == SlotStatus::Cancelled {
                    return; // idempotent
                }
                rs.status = SlotStatus::Cancelled;
                rs.reserved = 0;
                self.cancel_dependents(rs);
            }
            _ => {}
        }
    }

    /// Apply an event that touches only booking/reminder records.
    pub(super) fn apply_record_event(&self, event: &Event) {
        match event {
            Event::RemindersScheduled { booking_id, reminders } => {
                let list: Vec<Reminder> = reminders
                    .iter()
                    .cloned()
                    .map(ReminderSpec::into_reminder)
                    .collect();
                self.reminders.insert(*booking_id, list);
            }
            Event::ReminderSent { booking_id, audience, offset_ms } => {
                if let Some(mut list) = self.reminders.get_mut(booking_id)
                    && let Some(r) = list
                        .iter_mut()
                        .find(|r| r.audience == *audience && r.offset_ms == *offset_ms)
                {
                    r.sent = true;
                }
            }
            Event::BookingCompleted { id } => {
                if let Some(mut b) = self.bookings.get_mut(id)
                    && b.status.is_active()
                {
                    b.status = BookingStatus::Completed;
                }
            }
            _ => {}
        }
    }

    /// Compact the WAL by rewriting it with only the events needed to
    /// recreate the current state. Terminal bookings whose lesson start fell
    /// out of the retention window are dropped entirely.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let now = now_ms();
        let cutoff = now - self.config.retention_ms;
        let mut events = Vec::new();

        let keys: Vec<SlotKey> = self.slots.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            let Some(rs_arc) = self.get_slot(&key) else { continue };
            let mut guard = rs_arc.write().await;

            events.push(Event::SlotDefined {
                slot: guard.key.clone(),
                capacity: guard.capacity,
            });

            let effective_start = guard.effective_start();
            let mut kept = Vec::with_capacity(guard.bookings.len());
            for bid in guard.bookings.clone() {
                let Some(booking) = self.bookings.get(&bid).map(|b| b.clone()) else {
                    continue;
                };
                if booking.status.is_terminal() && effective_start < cutoff {
                    // A completed booking still holds its seat; give it back
                    // so replay of the compacted log matches live state.
                    if booking.status == BookingStatus::Completed {
                        guard.release();
                    }
                    self.bookings.remove(&bid);
                    self.reminders.remove(&bid);
                    continue;
                }
                kept.push(bid);

                events.push(Event::BookingCreated {
                    id: booking.id,
                    user_id: booking.user_id,
                    slot: booking.slot.clone(),
                    created_at: booking.created_at,
                });
                if let Some(list) = self.reminders.get(&bid) {
                    events.push(Event::RemindersScheduled {
                        booking_id: bid,
                        reminders: list
                            .iter()
                            .map(|r| ReminderSpec {
                                audience: r.audience,
                                offset_ms: r.offset_ms,
                                fire_at: r.fire_at,
                            })
                            .collect(),
                    });
                    for r in list.iter().filter(|r| r.sent) {
                        events.push(Event::ReminderSent {
                            booking_id: bid,
                            audience: r.audience,
                            offset_ms: r.offset_ms,
                        });
                    }
                }
                match booking.status {
                    // The cancelling actor is not recorded on the booking;
                    // it only shapes the live notification.
                    BookingStatus::Cancelled => events.push(Event::BookingCancelled {
                        id: bid,
                        actor: CancelActor::Admin,
                    }),
                    BookingStatus::Completed => {
                        events.push(Event::BookingCompleted { id: bid })
                    }
                    _ => {}
                }
            }
            guard.bookings = kept;

            // Slot status last, so its apply sees the replayed bookings.
            match guard.status {
                SlotStatus::Delayed { new_start } => events.push(Event::SlotDelayed {
                    slot: guard.key.clone(),
                    new_start,
                }),
                SlotStatus::Cancelled => {
                    events.push(Event::SlotCancelled { slot: guard.key.clone() })
                }
                SlotStatus::Open => {}
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
