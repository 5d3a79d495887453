//! Hard caps on externally supplied values, checked at the mutation entry
//! points.

use crate::model::Ms;

pub const MAX_SLOTS: usize = 100_000;

pub const MAX_SLOT_CAPACITY: u32 = 1_000;

/// Branch and subject names.
pub const MAX_NAME_LEN: usize = 128;

/// 1970-01-01.
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;

/// 2100-01-01.
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;
