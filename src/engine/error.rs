use ulid::Ulid;

use crate::model::BookingStatus;

#[derive(Debug)]
pub enum EngineError {
    /// No vehicle with enough seats is free on the requested date. Expected
    /// outcome, not a fault: fully booked dates happen routinely.
    NoCapacity,
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// The booking already carries a concrete vehicle; it is never reassigned.
    AlreadyAssigned(Ulid),
    /// The vehicle is held by another active booking on that date.
    Conflict { vehicle: Ulid },
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },
    /// Confirmation blocked: the booking is missing operational fields.
    NotSchedulable(&'static str),
    InvalidInput(&'static str),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NoCapacity => {
                write!(f, "no vehicle with enough seats is free on this date")
            }
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::AlreadyAssigned(id) => {
                write!(f, "booking {id} already has a vehicle assigned")
            }
            EngineError::Conflict { vehicle } => {
                write!(f, "vehicle {vehicle} is already booked on this date")
            }
            EngineError::InvalidTransition { from, to } => {
                write!(f, "booking cannot move from {from:?} to {to:?}")
            }
            EngineError::NotSchedulable(msg) => {
                write!(f, "booking cannot be confirmed: {msg}")
            }
            EngineError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
