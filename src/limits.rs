//! Hard input limits. Everything the engine stores is bounded so a single
//! request can never balloon memory or the WAL.

pub const MAX_VEHICLES: usize = 64;
pub const MAX_DRIVERS: usize = 64;
pub const MAX_BOOKINGS_PER_DAY: usize = 256;

/// Matches the fleet admin bound: nothing bigger than a minibus.
pub const MAX_SEATS: u32 = 50;

pub const MAX_NAME_LEN: usize = 120;
pub const MAX_EMAIL_LEN: usize = 254;
pub const MAX_PHONE_LEN: usize = 32;
pub const MAX_PLATE_LEN: usize = 16;
pub const MAX_NOTE_LEN: usize = 2000;
pub const MAX_TOUR_REF_LEN: usize = 200;
pub const MAX_LOCATION_LEN: usize = 200;

/// Bookable date window. Dates outside it are rejected before they reach
/// the ledger, so a typo'd year cannot create an unreachable day entry.
pub const MIN_BOOKABLE_YEAR: i32 = 2000;
pub const MAX_BOOKABLE_YEAR: i32 = 2100;
