use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::lifecycle::{
    check_schedulable, check_transition, check_vehicle_free, validate_customer, validate_date,
    validate_plan,
};
use super::{Engine, EngineError, WalCommand, matcher};
use tokio::sync::oneshot;

impl Engine {
    // ── Fleet registry ───────────────────────────────────────

    pub async fn add_vehicle(
        &self,
        id: Ulid,
        name: String,
        seats: u32,
        reg_plate: String,
        active: bool,
    ) -> Result<(), EngineError> {
        if self.fleet.len() >= MAX_VEHICLES {
            return Err(EngineError::LimitExceeded("too many vehicles"));
        }
        if name.trim().is_empty() || name.len() > MAX_NAME_LEN {
            return Err(EngineError::InvalidInput("vehicle name"));
        }
        if seats == 0 || seats > MAX_SEATS {
            return Err(EngineError::InvalidInput("vehicle seats out of range"));
        }
        if reg_plate.trim().is_empty() || reg_plate.len() > MAX_PLATE_LEN {
            return Err(EngineError::InvalidInput("registration plate"));
        }
        if self.fleet.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        if self
            .fleet
            .iter()
            .any(|e| e.value().reg_plate.eq_ignore_ascii_case(&reg_plate))
        {
            return Err(EngineError::InvalidInput("registration plate already in fleet"));
        }

        let event = Event::VehicleAdded {
            id,
            name: name.clone(),
            seats,
            reg_plate: reg_plate.clone(),
            active,
        };
        self.wal_append(&event).await?;
        self.fleet.insert(
            id,
            Vehicle {
                id,
                name,
                seats,
                reg_plate,
                active,
            },
        );
        metrics::gauge!(observability::FLEET_VEHICLES).set(self.fleet.len() as f64);
        Ok(())
    }

    /// Edit name, seats or the active flag. The plate is the vehicle's
    /// identity on the road and never changes.
    pub async fn update_vehicle(
        &self,
        id: Ulid,
        name: String,
        seats: u32,
        active: bool,
    ) -> Result<(), EngineError> {
        if name.trim().is_empty() || name.len() > MAX_NAME_LEN {
            return Err(EngineError::InvalidInput("vehicle name"));
        }
        if seats == 0 || seats > MAX_SEATS {
            return Err(EngineError::InvalidInput("vehicle seats out of range"));
        }
        if !self.fleet.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }

        let event = Event::VehicleUpdated {
            id,
            name: name.clone(),
            seats,
            active,
        };
        self.wal_append(&event).await?;
        if let Some(mut v) = self.fleet.get_mut(&id) {
            v.name = name;
            v.seats = seats;
            v.active = active;
        }
        Ok(())
    }

    pub async fn remove_vehicle(&self, id: Ulid) -> Result<(), EngineError> {
        if !self.fleet.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }
        let event = Event::VehicleRemoved { id };
        self.wal_append(&event).await?;
        self.fleet.remove(&id);
        metrics::gauge!(observability::FLEET_VEHICLES).set(self.fleet.len() as f64);
        Ok(())
    }

    // ── Driver registry ──────────────────────────────────────

    pub async fn add_driver(
        &self,
        id: Ulid,
        name: String,
        phone: Option<String>,
        active: bool,
    ) -> Result<(), EngineError> {
        if self.drivers.len() >= MAX_DRIVERS {
            return Err(EngineError::LimitExceeded("too many drivers"));
        }
        if name.trim().is_empty() || name.len() > MAX_NAME_LEN {
            return Err(EngineError::InvalidInput("driver name"));
        }
        if let Some(p) = &phone
            && p.len() > MAX_PHONE_LEN {
                return Err(EngineError::LimitExceeded("driver phone too long"));
            }
        if self.drivers.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::DriverAdded {
            id,
            name: name.clone(),
            phone: phone.clone(),
            active,
        };
        self.wal_append(&event).await?;
        self.drivers.insert(
            id,
            Driver {
                id,
                name,
                phone,
                active,
            },
        );
        Ok(())
    }

    pub async fn update_driver(
        &self,
        id: Ulid,
        name: String,
        phone: Option<String>,
        active: bool,
    ) -> Result<(), EngineError> {
        if name.trim().is_empty() || name.len() > MAX_NAME_LEN {
            return Err(EngineError::InvalidInput("driver name"));
        }
        if !self.drivers.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }
        let event = Event::DriverUpdated {
            id,
            name: name.clone(),
            phone: phone.clone(),
            active,
        };
        self.wal_append(&event).await?;
        if let Some(mut d) = self.drivers.get_mut(&id) {
            d.name = name;
            d.phone = phone;
            d.active = active;
        }
        Ok(())
    }

    pub async fn remove_driver(&self, id: Ulid) -> Result<(), EngineError> {
        if !self.drivers.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }
        let event = Event::DriverRemoved { id };
        self.wal_append(&event).await?;
        self.drivers.remove(&id);
        Ok(())
    }

    // ── Allocation Service ───────────────────────────────────

    /// Decide and persist one allocation: the only place a vehicle is ever
    /// chosen for a new web booking. Runs entirely under the date's write
    /// lock, so two racing requests for the same date serialize and the
    /// second sees the first's booking; a double-assigned vehicle cannot
    /// happen. On `NoCapacity` no booking is created.
    pub async fn request_booking(
        &self,
        date: NaiveDate,
        party: PartySize,
        customer: Customer,
        tour: Option<String>,
        note: Option<String>,
    ) -> Result<(Ulid, Ulid), EngineError> {
        validate_date(date)?;
        validate_customer(&customer)?;
        validate_refs(&tour, &note)?;

        let decide_start = std::time::Instant::now();
        let day = self.day_entry(date);
        let mut guard = day.write().await;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_DAY {
            return Err(EngineError::LimitExceeded("too many bookings on this date"));
        }

        let fleet = self.fleet_snapshot();
        let view = guard.active_view();
        let Some(vehicle) = matcher::pick_vehicle(&fleet, &view, party) else {
            metrics::counter!(observability::ALLOCATIONS_TOTAL, "outcome" => "no_capacity")
                .increment(1);
            return Err(EngineError::NoCapacity);
        };
        let vehicle_id = vehicle.id;

        let id = Ulid::new();
        let event = Event::BookingRequested {
            id,
            date,
            party,
            vehicle: Some(vehicle_id),
            customer,
            tour,
            note,
            source: BookingSource::Website,
        };
        self.persist_and_apply(date, &mut guard, &event).await?;

        metrics::counter!(observability::ALLOCATIONS_TOTAL, "outcome" => "allocated").increment(1);
        metrics::histogram!(observability::ALLOCATION_DURATION_SECONDS)
            .record(decide_start.elapsed().as_secs_f64());
        metrics::counter!(observability::BOOKINGS_TOTAL, "status" => "pending").increment(1);
        Ok((id, vehicle_id))
    }

    /// Operator-entered booking with no vehicle decided yet. It still
    /// consumes capacity: the matcher's virtual-reservation pass counts it
    /// on every later run for this date.
    pub async fn add_manual_booking(
        &self,
        date: NaiveDate,
        party: PartySize,
        customer: Customer,
        tour: Option<String>,
        note: Option<String>,
    ) -> Result<Ulid, EngineError> {
        validate_date(date)?;
        validate_customer(&customer)?;
        validate_refs(&tour, &note)?;

        let day = self.day_entry(date);
        let mut guard = day.write().await;
        if guard.bookings.len() >= MAX_BOOKINGS_PER_DAY {
            return Err(EngineError::LimitExceeded("too many bookings on this date"));
        }

        let id = Ulid::new();
        let event = Event::BookingRequested {
            id,
            date,
            party,
            vehicle: None,
            customer,
            tour,
            note,
            source: BookingSource::Manual,
        };
        self.persist_and_apply(date, &mut guard, &event).await?;
        metrics::counter!(observability::BOOKINGS_TOTAL, "status" => "pending").increment(1);
        Ok(id)
    }

    // ── Booking lifecycle ────────────────────────────────────

    /// Give an unassigned booking its concrete vehicle, exactly once.
    /// With `vehicle = None` the engine picks via the matcher; with an
    /// explicit vehicle the choice is validated against seats, the active
    /// flag and the date's occupancy.
    pub async fn assign_vehicle(
        &self,
        id: Ulid,
        vehicle: Option<Ulid>,
    ) -> Result<Ulid, EngineError> {
        let (date, mut guard) = self.resolve_booking_write(&id).await?;
        let (party, current_vehicle, status) = {
            let b = guard.get(id).ok_or(EngineError::NotFound(id))?;
            (b.party, b.vehicle, b.status)
        };
        if status == BookingStatus::Cancelled {
            return Err(EngineError::InvalidInput("booking is cancelled"));
        }
        if current_vehicle.is_some() {
            return Err(EngineError::AlreadyAssigned(id));
        }

        let chosen = match vehicle {
            Some(vid) => {
                let v = self
                    .fleet
                    .get(&vid)
                    .map(|e| e.value().clone())
                    .ok_or(EngineError::NotFound(vid))?;
                if !v.active {
                    return Err(EngineError::InvalidInput("vehicle is inactive"));
                }
                if v.seats < party.required_seats() {
                    return Err(EngineError::InvalidInput("vehicle too small for the party"));
                }
                check_vehicle_free(&guard, vid, id)?;
                vid
            }
            None => {
                let fleet = self.fleet_snapshot();
                // This booking's own unassigned entry is excluded so it does
                // not virtually reserve a vehicle against itself.
                let view = guard.active_view_excluding(id);
                matcher::pick_vehicle(&fleet, &view, party)
                    .ok_or(EngineError::NoCapacity)?
                    .id
            }
        };

        let event = Event::VehicleAssigned {
            id,
            date,
            vehicle: chosen,
        };
        self.persist_and_apply(date, &mut guard, &event).await?;
        Ok(chosen)
    }

    /// Record the operational trip plan. Required before confirmation.
    pub async fn schedule_booking(&self, id: Ulid, plan: TripPlan) -> Result<(), EngineError> {
        let driver = self
            .drivers
            .get(&plan.driver)
            .map(|e| e.value().clone())
            .ok_or(EngineError::NotFound(plan.driver))?;
        if !driver.active {
            return Err(EngineError::InvalidInput("driver is inactive"));
        }

        let (date, mut guard) = self.resolve_booking_write(&id).await?;
        let (party, status) = {
            let b = guard.get(id).ok_or(EngineError::NotFound(id))?;
            (b.party, b.status)
        };
        if status == BookingStatus::Cancelled {
            return Err(EngineError::InvalidInput("booking is cancelled"));
        }
        validate_plan(&plan, party)?;

        let event = Event::BookingScheduled { id, date, plan };
        self.persist_and_apply(date, &mut guard, &event).await
    }

    /// Pending→Confirmed or Cancelled→Confirmed. Fails loudly when the
    /// booking is missing anything needed to run the trip, instead of
    /// silently confirming an unschedulable one. Re-confirming a cancelled
    /// booking re-checks that its vehicle is still free on the date.
    pub async fn confirm_booking(&self, id: Ulid) -> Result<(), EngineError> {
        let (date, mut guard) = self.resolve_booking_write(&id).await?;
        {
            let b = guard.get(id).ok_or(EngineError::NotFound(id))?;
            check_transition(b.status, BookingStatus::Confirmed)?;
            let vehicle = check_schedulable(b)?;
            if b.status == BookingStatus::Cancelled {
                check_vehicle_free(&guard, vehicle, id)?;
            }
        }

        let event = Event::BookingConfirmed { id, date };
        self.persist_and_apply(date, &mut guard, &event).await?;
        metrics::counter!(observability::BOOKINGS_TOTAL, "status" => "confirmed").increment(1);
        Ok(())
    }

    /// Pending/Confirmed→Cancelled. The only allocation-relevant effect is
    /// that the booking drops out of every active ledger view, which frees
    /// its vehicle for this date on all subsequent matcher runs.
    pub async fn cancel_booking(&self, id: Ulid) -> Result<(), EngineError> {
        let (date, mut guard) = self.resolve_booking_write(&id).await?;
        {
            let b = guard.get(id).ok_or(EngineError::NotFound(id))?;
            check_transition(b.status, BookingStatus::Cancelled)?;
        }

        let event = Event::BookingCancelled { id, date };
        self.persist_and_apply(date, &mut guard, &event).await?;
        metrics::counter!(observability::BOOKINGS_TOTAL, "status" => "cancelled").increment(1);
        Ok(())
    }

    // ── WAL maintenance ──────────────────────────────────────

    /// Compact the WAL by rewriting it with only the events needed to
    /// recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        for entry in self.fleet.iter() {
            let v = entry.value();
            events.push(Event::VehicleAdded {
                id: v.id,
                name: v.name.clone(),
                seats: v.seats,
                reg_plate: v.reg_plate.clone(),
                active: v.active,
            });
        }
        for entry in self.drivers.iter() {
            let d = entry.value();
            events.push(Event::DriverAdded {
                id: d.id,
                name: d.name.clone(),
                phone: d.phone.clone(),
                active: d.active,
            });
        }

        let day_arcs: Vec<super::SharedDayLedger> =
            self.days.iter().map(|e| e.value().clone()).collect();
        for day in day_arcs {
            let guard = day.read().await;
            for b in &guard.bookings {
                events.push(Event::BookingRequested {
                    id: b.id,
                    date: b.date,
                    party: b.party,
                    vehicle: b.vehicle,
                    customer: b.customer.clone(),
                    tour: b.tour.clone(),
                    note: b.note.clone(),
                    source: b.source,
                });
                if let Some(plan) = &b.plan {
                    events.push(Event::BookingScheduled {
                        id: b.id,
                        date: b.date,
                        plan: plan.clone(),
                    });
                }
                match b.status {
                    BookingStatus::Confirmed => {
                        events.push(Event::BookingConfirmed { id: b.id, date: b.date });
                    }
                    BookingStatus::Cancelled => {
                        events.push(Event::BookingCancelled { id: b.id, date: b.date });
                    }
                    BookingStatus::Pending => {}
                }
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, ack: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped ack".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { ack: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

fn validate_refs(tour: &Option<String>, note: &Option<String>) -> Result<(), EngineError> {
    if let Some(t) = tour
        && t.len() > MAX_TOUR_REF_LEN {
            return Err(EngineError::LimitExceeded("tour reference too long"));
        }
    if let Some(n) = note
        && n.len() > MAX_NOTE_LEN {
            return Err(EngineError::LimitExceeded("note too long"));
        }
    Ok(())
}
