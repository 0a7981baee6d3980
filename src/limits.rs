//! Hard bounds on inputs and state size.

pub const MAX_ROOMS: usize = 10_000;
pub const MAX_ROOM_TYPES: usize = 256;
pub const MAX_SEASON_RULES: usize = 1_000;

/// Highest nightly base rate a room may carry, in currency units.
pub const MAX_BASE_RATE: i64 = 1_000_000;
/// Highest season multiplier.
pub const MAX_MULTIPLIER: i64 = 100;

/// Longest bookable stay, and widest availability search.
pub const MAX_STAY_NIGHTS: i64 = 365;

pub const MAX_RESERVATIONS_PER_ROOM: usize = 100_000;

pub const MAX_NAME_LEN: usize = 256;
pub const MAX_NOTES_LEN: usize = 2_000;
pub const MAX_REASON_LEN: usize = 500;
