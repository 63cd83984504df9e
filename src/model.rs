use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// The two party-size classes bookings come in. Required seats is a step
/// function of the class, never of the literal passenger count: a party of
/// four and a party of seven need the same vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartySize {
    #[serde(rename = "1-3")]
    Small,
    #[serde(rename = "4-7")]
    Large,
}

impl PartySize {
    /// Seats a vehicle must have to serve this class.
    pub fn required_seats(self) -> u32 {
        match self {
            PartySize::Small => 3,
            PartySize::Large => 7,
        }
    }

    /// Passenger counts that belong to this class.
    pub fn passenger_range(self) -> std::ops::RangeInclusive<u32> {
        match self {
            PartySize::Small => 1..=3,
            PartySize::Large => 4..=7,
        }
    }

    /// Wire token as the public API spells it.
    pub fn token(self) -> &'static str {
        match self {
            PartySize::Small => "1-3",
            PartySize::Large => "4-7",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "1-3" => Some(PartySize::Small),
            "4-7" => Some(PartySize::Large),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    /// Active bookings consume capacity; cancelled ones never do.
    pub fn is_active(self) -> bool {
        !matches!(self, BookingStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingSource {
    Website,
    Manual,
}

/// A vehicle in the fleet. Inactive vehicles are invisible to the matcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vehicle {
    pub id: Ulid,
    pub name: String,
    pub seats: u32,
    pub reg_plate: String,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Driver {
    pub id: Ulid,
    pub name: String,
    pub phone: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

/// Operational fields an operator must fill in before a booking can be
/// confirmed. Without a complete plan the trip cannot be driven.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TripPlan {
    pub pickup_time: NaiveTime,
    pub pickup: String,
    pub dropoff: String,
    pub passengers: u32,
    pub driver: Ulid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Ulid,
    pub date: NaiveDate,
    pub party: PartySize,
    /// None means "no concrete vehicle yet"; the booking still consumes
    /// capacity through the matcher's virtual-reservation pass.
    pub vehicle: Option<Ulid>,
    pub status: BookingStatus,
    pub customer: Customer,
    /// Opaque product reference; the CMS owns tour content.
    pub tour: Option<String>,
    pub note: Option<String>,
    pub source: BookingSource,
    pub plan: Option<TripPlan>,
}

impl Booking {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// The matcher's view of one ledger entry: just enough to decide capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerEntry {
    pub vehicle: Option<Ulid>,
    pub party: PartySize,
}

/// All bookings for one calendar date, in creation order.
#[derive(Debug, Clone)]
pub struct DayLedger {
    pub date: NaiveDate,
    pub bookings: Vec<Booking>,
}

impl DayLedger {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            bookings: Vec::new(),
        }
    }

    pub fn push(&mut self, booking: Booking) {
        self.bookings.push(booking);
    }

    pub fn get(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn get_mut(&mut self, id: Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Non-cancelled bookings, in creation order.
    pub fn active(&self) -> impl Iterator<Item = &Booking> {
        self.bookings.iter().filter(|b| b.is_active())
    }

    /// Matcher input: the active ledger entries for this date.
    pub fn active_view(&self) -> Vec<LedgerEntry> {
        self.active()
            .map(|b| LedgerEntry {
                vehicle: b.vehicle,
                party: b.party,
            })
            .collect()
    }

    /// Matcher input with one booking left out, used when re-deciding that
    /// booking's own vehicle.
    pub fn active_view_excluding(&self, exclude: Ulid) -> Vec<LedgerEntry> {
        self.active()
            .filter(|b| b.id != exclude)
            .map(|b| LedgerEntry {
                vehicle: b.vehicle,
                party: b.party,
            })
            .collect()
    }

    /// True if an active booking other than `exclude` already holds `vehicle`.
    pub fn vehicle_taken(&self, vehicle: Ulid, exclude: Ulid) -> bool {
        self.active()
            .any(|b| b.id != exclude && b.vehicle == Some(vehicle))
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    VehicleAdded {
        id: Ulid,
        name: String,
        seats: u32,
        reg_plate: String,
        active: bool,
    },
    VehicleUpdated {
        id: Ulid,
        name: String,
        seats: u32,
        active: bool,
    },
    VehicleRemoved {
        id: Ulid,
    },
    DriverAdded {
        id: Ulid,
        name: String,
        phone: Option<String>,
        active: bool,
    },
    DriverUpdated {
        id: Ulid,
        name: String,
        phone: Option<String>,
        active: bool,
    },
    DriverRemoved {
        id: Ulid,
    },
    /// A new booking, with the allocation decision already made: `vehicle`
    /// is Some for web bookings (the Allocation Service chose it) and None
    /// for operator-entered manual bookings.
    BookingRequested {
        id: Ulid,
        date: NaiveDate,
        party: PartySize,
        vehicle: Option<Ulid>,
        customer: Customer,
        tour: Option<String>,
        note: Option<String>,
        source: BookingSource,
    },
    /// A previously unassigned booking got its concrete vehicle.
    VehicleAssigned {
        id: Ulid,
        date: NaiveDate,
        vehicle: Ulid,
    },
    BookingScheduled {
        id: Ulid,
        date: NaiveDate,
        plan: TripPlan,
    },
    BookingConfirmed {
        id: Ulid,
        date: NaiveDate,
    },
    BookingCancelled {
        id: Ulid,
        date: NaiveDate,
    },
}
