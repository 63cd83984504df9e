//! fleetd — books private tours and transfers against a small fleet of
//! multi-seat vehicles. The core is the allocation engine: a deterministic
//! capacity matcher, a date-serialized allocation service, and a month
//! availability scanner, persisted through a write-ahead event log.

pub mod compactor;
pub mod engine;
pub mod http;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod wal;
