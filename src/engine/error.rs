use ulid::Ulid;

use crate::model::SlotKey;

#[derive(Debug)]
pub enum EngineError {
    SlotNotFound(SlotKey),
    SlotExists(SlotKey),
    /// The slot is not accepting reservations (delayed or cancelled).
    SlotClosed(SlotKey),
    SlotFull { capacity: u32 },
    SlotAlreadyCancelled(SlotKey),
    BookingNotFound(Ulid),
    /// The user already holds an active booking for this slot.
    DuplicateBooking { user_id: i64, slot: SlotKey },
    AlreadyCancelled(Ulid),
    InvalidState(&'static str),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::SlotNotFound(key) => write!(f, "slot not found: {key}"),
            EngineError::SlotExists(key) => write!(f, "slot already defined: {key}"),
            EngineError::SlotClosed(key) => write!(f, "slot not open for booking: {key}"),
            EngineError::SlotFull { capacity } => {
                write!(f, "slot full: all {capacity} seats reserved")
            }
            EngineError::SlotAlreadyCancelled(key) => {
                write!(f, "slot already cancelled: {key}")
            }
            EngineError::BookingNotFound(id) => write!(f, "booking not found: {id}"),
            EngineError::DuplicateBooking { user_id, slot } => {
                write!(f, "user {user_id} already holds a booking for {slot}")
            }
            EngineError::AlreadyCancelled(id) => write!(f, "booking already cancelled: {id}"),
            EngineError::InvalidState(msg) => write!(f, "invalid state: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
