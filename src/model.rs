use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only time type.
pub type Ms = i64;

pub fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as Ms
}

/// Slot identity: a coarse time bucket at a branch for one subject.
/// `start` is the scheduled start in UTC ms; `date` is the calendar day
/// (`YYYY-MM-DD`) the front end groups slots by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotKey {
    pub branch: String,
    pub subject: String,
    pub date: String,
    pub start: Ms,
}

impl SlotKey {
    pub fn new(branch: &str, subject: &str, date: &str, start: Ms) -> Self {
        Self {
            branch: branch.to_string(),
            subject: subject.to_string(),
            date: date.to_string(),
            start,
        }
    }
}

impl std::fmt::Display for SlotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} {}@{}",
            self.branch, self.subject, self.date, self.start
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotStatus {
    Open,
    /// Admin moved the start without changing the slot's identity.
    Delayed { new_start: Ms },
    Cancelled,
}

/// Mutable per-slot state. Guarded by one RwLock per slot — reserved/status
/// mutations happen only under its write lock.
#[derive(Debug, Clone)]
pub struct SlotState {
    pub key: SlotKey,
    pub capacity: u32,
    pub reserved: u32,
    pub status: SlotStatus,
    /// Every booking ever issued against this slot, terminal ones included.
    pub bookings: Vec<Ulid>,
}

impl SlotState {
    pub fn new(key: SlotKey, capacity: u32) -> Self {
        Self {
            key,
            capacity,
            reserved: 0,
            status: SlotStatus::Open,
            bookings: Vec::new(),
        }
    }

    /// Start time bookings and reminders derive from — the delayed start
    /// when the slot has been moved, the scheduled start otherwise.
    pub fn effective_start(&self) -> Ms {
        match self.status {
            SlotStatus::Delayed { new_start } => new_start,
            _ => self.key.start,
        }
    }

    pub fn reserve(&mut self) {
        self.reserved += 1;
    }

    /// Floored at zero; exactly-once per booking is the caller's job.
    pub fn release(&mut self) {
        self.reserved = self.reserved.saturating_sub(1);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    /// Reserved but not yet confirmed. Unused today — `book` confirms
    /// immediately since there is no payment step — kept distinct so a
    /// confirmation step can be added without a schema change.
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

/// Who asked for a cancellation. Changes the notification sent, never the
/// state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelActor {
    User,
    Admin,
}

/// A user's claim on one unit of a slot's capacity. References its slot by
/// identity — never by position — since delays replace effective times in
/// place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub user_id: i64,
    pub slot: SlotKey,
    pub status: BookingStatus,
    pub created_at: Ms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Audience {
    Student,
    Teacher,
}

/// One scheduled notification for a booking. Identity within the booking is
/// (audience, offset_ms). `fire_at` is always derived from the slot's
/// current effective start minus the offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub audience: Audience,
    pub offset_ms: Ms,
    pub fire_at: Ms,
    /// Exactly-once guard. Flipped before dispatch, never cleared.
    pub sent: bool,
    /// Logically deleted; a suppressed reminder is skipped forever.
    pub suppressed: bool,
}

/// The parameters of a reminder as persisted in the WAL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderSpec {
    pub audience: Audience,
    pub offset_ms: Ms,
    pub fire_at: Ms,
}

impl ReminderSpec {
    pub fn into_reminder(self) -> Reminder {
        Reminder {
            audience: self.audience,
            offset_ms: self.offset_ms,
            fire_at: self.fire_at,
            sent: false,
            suppressed: false,
        }
    }
}

/// The event types — flat, no nesting. This is the WAL record format; one
/// applied event is one atomic state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    SlotDefined {
        slot: SlotKey,
        capacity: u32,
    },
    /// Moves the effective start and re-derives every dependent unsent
    /// reminder in the same transition.
    SlotDelayed {
        slot: SlotKey,
        new_start: Ms,
    },
    /// Zeroes the seat count, cancels every active dependent booking and
    /// suppresses their reminders in the same transition.
    SlotCancelled {
        slot: SlotKey,
    },
    BookingCreated {
        id: Ulid,
        user_id: i64,
        slot: SlotKey,
        created_at: Ms,
    },
    BookingCancelled {
        id: Ulid,
        actor: CancelActor,
    },
    BookingCompleted {
        id: Ulid,
    },
    RemindersScheduled {
        booking_id: Ulid,
        reminders: Vec<ReminderSpec>,
    },
    ReminderSent {
        booking_id: Ulid,
        audience: Audience,
        offset_ms: Ms,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotInfo {
    pub key: SlotKey,
    pub capacity: u32,
    pub reserved: u32,
    pub status: SlotStatus,
    pub effective_start: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingInfo {
    pub id: Ulid,
    pub user_id: i64,
    pub slot: SlotKey,
    pub status: BookingStatus,
    /// Effective lesson start, delay already applied.
    pub start: Ms,
    pub created_at: Ms,
}
