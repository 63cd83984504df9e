use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;
use crate::observability;

use super::{Engine, EngineError, matcher};

impl Engine {
    /// The matcher's fleet input: active vehicles, ascending by seats with
    /// the id as deterministic tie-break. The required ordering lives here
    /// and nowhere else.
    pub fn fleet_snapshot(&self) -> Vec<Vehicle> {
        let mut fleet: Vec<Vehicle> = self
            .fleet
            .iter()
            .filter(|e| e.value().active)
            .map(|e| e.value().clone())
            .collect();
        fleet.sort_by(|a, b| a.seats.cmp(&b.seats).then(a.id.cmp(&b.id)));
        fleet
    }

    pub fn list_vehicles(&self) -> Vec<Vehicle> {
        let mut vehicles: Vec<Vehicle> = self.fleet.iter().map(|e| e.value().clone()).collect();
        vehicles.sort_by_key(|v| v.id);
        vehicles
    }

    pub fn list_drivers(&self) -> Vec<Driver> {
        let mut drivers: Vec<Driver> = self.drivers.iter().map(|e| e.value().clone()).collect();
        drivers.sort_by_key(|d| d.id);
        drivers
    }

    // ── Availability Scanner ─────────────────────────────────

    /// Dates in the month with no remaining capacity for the class: the
    /// matcher, run once per day against that day's active ledger, finds
    /// nothing. Read-only and advisory; the allocation service re-checks
    /// at submission time and always wins.
    pub async fn scan_month(
        &self,
        year: i32,
        month: u32,
        party: PartySize,
    ) -> Result<Vec<NaiveDate>, EngineError> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or(EngineError::InvalidInput("month out of range"))?;
        super::lifecycle::validate_date(first)?;

        let fleet = self.fleet_snapshot();
        let mut fully_booked = Vec::new();

        for day in 1..=days_in_month(year, month) {
            // Day numbers below days_in_month are always valid dates.
            let Some(date) = NaiveDate::from_ymd_opt(year, month, day) else {
                continue;
            };
            let view = match self.day_ledger(&date) {
                Some(ledger) => ledger.read().await.active_view(),
                None => Vec::new(),
            };
            if matcher::pick_vehicle(&fleet, &view, party).is_none() {
                fully_booked.push(date);
            }
        }

        metrics::counter!(observability::MONTH_SCANS_TOTAL).increment(1);
        Ok(fully_booked)
    }

    // ── Booking lookups ──────────────────────────────────────

    pub async fn get_booking(&self, id: Ulid) -> Option<Booking> {
        let date = self.booking_dates.get(&id).map(|e| *e.value())?;
        let ledger = self.day_ledger(&date)?;
        let guard = ledger.read().await;
        guard.get(id).cloned()
    }

    /// All bookings for a date (cancelled included), creation order.
    pub async fn bookings_for_date(&self, date: NaiveDate) -> Vec<Booking> {
        match self.day_ledger(&date) {
            Some(ledger) => ledger.read().await.bookings.clone(),
            None => Vec::new(),
        }
    }
}

/// Days in a proleptic-Gregorian month.
pub(crate) fn days_in_month(year: i32, month: u32) -> u32 {
    let first = NaiveDate::from_ymd_opt(year, month, 1).expect("caller validated the month");
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .expect("month arithmetic stays in range");
    next.signed_duration_since(first).num_days() as u32
}
