use chrono::{Datelike, NaiveDate};
use ulid::Ulid;

use crate::limits::*;
use crate::model::{Booking, BookingStatus, Customer, DayLedger, PartySize, TripPlan};

use super::EngineError;

pub(crate) fn validate_date(date: NaiveDate) -> Result<(), EngineError> {
    if date.year() < MIN_BOOKABLE_YEAR || date.year() > MAX_BOOKABLE_YEAR {
        return Err(EngineError::InvalidInput("date out of bookable range"));
    }
    Ok(())
}

pub(crate) fn validate_customer(customer: &Customer) -> Result<(), EngineError> {
    if customer.name.trim().len() < 2 {
        return Err(EngineError::InvalidInput("customer name too short"));
    }
    if customer.name.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("customer name too long"));
    }
    if customer.email.len() > MAX_EMAIL_LEN {
        return Err(EngineError::LimitExceeded("customer email too long"));
    }
    if !customer.email.contains('@') {
        return Err(EngineError::InvalidInput("customer email malformed"));
    }
    if let Some(phone) = &customer.phone
        && phone.len() > MAX_PHONE_LEN {
            return Err(EngineError::LimitExceeded("customer phone too long"));
        }
    Ok(())
}

pub(crate) fn validate_plan(plan: &TripPlan, party: PartySize) -> Result<(), EngineError> {
    if !party.passenger_range().contains(&plan.passengers) {
        return Err(EngineError::InvalidInput(
            "passenger count outside the party-size class",
        ));
    }
    if plan.pickup.trim().is_empty() || plan.dropoff.trim().is_empty() {
        return Err(EngineError::InvalidInput("pickup and dropoff are required"));
    }
    if plan.pickup.len() > MAX_LOCATION_LEN || plan.dropoff.len() > MAX_LOCATION_LEN {
        return Err(EngineError::LimitExceeded("location too long"));
    }
    Ok(())
}

/// Allowed status moves: Pending/Confirmed/Cancelled in either direction,
/// except nothing re-enters Pending and no-op moves are rejected.
pub(crate) fn check_transition(
    from: BookingStatus,
    to: BookingStatus,
) -> Result<(), EngineError> {
    if from == to || to == BookingStatus::Pending {
        return Err(EngineError::InvalidTransition { from, to });
    }
    Ok(())
}

/// Confirmation gate: a booking may only be confirmed once it carries
/// everything needed to actually run the trip. Returns the assigned vehicle.
pub(crate) fn check_schedulable(booking: &Booking) -> Result<Ulid, EngineError> {
    let Some(vehicle) = booking.vehicle else {
        return Err(EngineError::NotSchedulable("no vehicle assigned"));
    };
    if booking.plan.is_none() {
        return Err(EngineError::NotSchedulable(
            "no trip plan (pickup time, locations, passengers, driver)",
        ));
    }
    Ok(vehicle)
}

/// The per-date uniqueness invariant: no other active booking on this date
/// may hold the vehicle.
pub(crate) fn check_vehicle_free(
    ledger: &DayLedger,
    vehicle: Ulid,
    exclude: Ulid,
) -> Result<(), EngineError> {
    if ledger.vehicle_taken(vehicle, exclude) {
        return Err(EngineError::Conflict { vehicle });
    }
    Ok(())
}
