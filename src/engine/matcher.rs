use std::collections::HashSet;

use ulid::Ulid;

use crate::model::{LedgerEntry, PartySize, Vehicle};

// ── Capacity Matcher ──────────────────────────────────────────────
//
// Pure function: no I/O, no randomness, no hidden state. The availability
// scanner calls it once per day without ever persisting a result; the
// allocation service calls it once more under the date lock and persists
// what it returns.

/// Pick the vehicle that should serve a new booking of `requested` class.
///
/// `fleet` must contain only active vehicles, sorted ascending by
/// `(seats, id)`. `ledger` must contain only non-cancelled bookings for a
/// single date, in creation order. Returns None when nothing fits.
///
/// Two-pass greedy:
/// 1. Vehicles named by already-assigned bookings are occupied.
/// 2. Unassigned bookings virtually reserve vehicles, large parties first,
///    so a large party is never starved of the only vehicle that can take
///    it by a small party that would fit anywhere. Smallest fit wins in
///    both passes, keeping big vehicles in reserve for big parties.
pub fn pick_vehicle<'a>(
    fleet: &'a [Vehicle],
    ledger: &[LedgerEntry],
    requested: PartySize,
) -> Option<&'a Vehicle> {
    let mut occupied: HashSet<Ulid> = ledger.iter().filter_map(|e| e.vehicle).collect();

    for entry in unassigned_large_first(ledger) {
        if let Some(v) = smallest_fit(fleet, &occupied, entry.party.required_seats()) {
            occupied.insert(v.id);
        }
        // An unassigned booking no vehicle can take reserves nothing; it
        // only mattered for whether later candidates see capacity as free.
    }

    smallest_fit(fleet, &occupied, requested.required_seats())
}

/// Unassigned ledger entries, Large class first, creation order preserved
/// within each class.
fn unassigned_large_first<'a>(ledger: &'a [LedgerEntry]) -> impl Iterator<Item = &'a LedgerEntry> {
    let by_class = |class: PartySize| {
        ledger
            .iter()
            .filter(move |e| e.vehicle.is_none() && e.party == class)
    };
    by_class(PartySize::Large).chain(by_class(PartySize::Small))
}

/// First vehicle (ascending seats) with enough seats and not yet occupied.
fn smallest_fit<'a>(
    fleet: &'a [Vehicle],
    occupied: &HashSet<Ulid>,
    required_seats: u32,
) -> Option<&'a Vehicle> {
    fleet
        .iter()
        .find(|v| v.seats >= required_seats && !occupied.contains(&v.id))
}
