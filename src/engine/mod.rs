mod error;
mod lifecycle;
pub mod matcher;
mod mutations;
mod queries;
#[cfg(test)]
mod tests;

pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::observability;
use crate::wal::Wal;

pub type SharedDayLedger = Arc<RwLock<DayLedger>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        ack: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        ack: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        ack: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit:
/// block until the first Append arrives, drain whatever else is already
/// queued, write the whole batch, one fsync, then ack every sender.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let mut batch = Vec::new();
        match cmd {
            WalCommand::Append { event, ack } => batch.push((event, ack)),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        }

        // Batch window: drain all immediately available appends. A
        // non-append command ends the window; it runs after the flush so
        // its callers observe every acknowledged event.
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, ack } => batch.push((event, ack)),
                other => {
                    deferred = Some(other);
                    break;
                }
            }
        }

        metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        respond_batch(batch, &result);

        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, ack } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = ack.send(result);
        }
        WalCommand::AppendsSinceCompact { ack } => {
            let _ = ack.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The allocation engine: fleet and driver registries plus one booking
/// ledger per calendar date. Mutations for a date run under that date's
/// write lock, which is what makes allocation race-free.
pub struct Engine {
    pub fleet: DashMap<Ulid, Vehicle>,
    pub drivers: DashMap<Ulid, Driver>,
    pub(super) days: DashMap<NaiveDate, SharedDayLedger>,
    /// Reverse lookup: booking id → the date whose ledger holds it.
    pub(super) booking_dates: DashMap<Ulid, NaiveDate>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
}

/// Apply a booking event directly to a DayLedger (no locking — caller holds
/// the lock). Fleet and driver events are handled at the Engine level.
fn apply_to_day(ledger: &mut DayLedger, event: &Event, index: &DashMap<Ulid, NaiveDate>) {
    match event {
        Event::BookingRequested {
            id,
            date,
            party,
            vehicle,
            customer,
            tour,
            note,
            source,
        } => {
            ledger.push(Booking {
                id: *id,
                date: *date,
                party: *party,
                vehicle: *vehicle,
                status: BookingStatus::Pending,
                customer: customer.clone(),
                tour: tour.clone(),
                note: note.clone(),
                source: *source,
                plan: None,
            });
            index.insert(*id, *date);
        }
        Event::VehicleAssigned { id, vehicle, .. } => {
            if let Some(b) = ledger.get_mut(*id) {
                b.vehicle = Some(*vehicle);
            }
        }
        Event::BookingScheduled { id, plan, .. } => {
            if let Some(b) = ledger.get_mut(*id) {
                b.plan = Some(plan.clone());
            }
        }
        Event::BookingConfirmed { id, .. } => {
            if let Some(b) = ledger.get_mut(*id) {
                b.status = BookingStatus::Confirmed;
            }
        }
        // The record stays in the ledger; every capacity view filters on
        // status, so cancelling frees the vehicle with no cleanup step.
        Event::BookingCancelled { id, .. } => {
            if let Some(b) = ledger.get_mut(*id) {
                b.status = BookingStatus::Cancelled;
            }
        }
        Event::VehicleAdded { .. }
        | Event::VehicleUpdated { .. }
        | Event::VehicleRemoved { .. }
        | Event::DriverAdded { .. }
        | Event::DriverUpdated { .. }
        | Event::DriverRemoved { .. } => {}
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            fleet: DashMap::new(),
            drivers: DashMap::new(),
            days: DashMap::new(),
            booking_dates: DashMap::new(),
            wal_tx,
            notify,
        };

        // Replay — we're the sole owner of the day Arcs here, so try_write
        // always succeeds instantly. Never use blocking_write: this may run
        // inside an async context.
        for event in &events {
            match event {
                Event::VehicleAdded { id, name, seats, reg_plate, active } => {
                    engine.fleet.insert(
                        *id,
                        Vehicle {
                            id: *id,
                            name: name.clone(),
                            seats: *seats,
                            reg_plate: reg_plate.clone(),
                            active: *active,
                        },
                    );
                }
                Event::VehicleUpdated { id, name, seats, active } => {
                    if let Some(mut v) = engine.fleet.get_mut(id) {
                        v.name = name.clone();
                        v.seats = *seats;
                        v.active = *active;
                    }
                }
                Event::VehicleRemoved { id } => {
                    engine.fleet.remove(id);
                }
                Event::DriverAdded { id, name, phone, active } => {
                    engine.drivers.insert(
                        *id,
                        Driver {
                            id: *id,
                            name: name.clone(),
                            phone: phone.clone(),
                            active: *active,
                        },
                    );
                }
                Event::DriverUpdated { id, name, phone, active } => {
                    if let Some(mut d) = engine.drivers.get_mut(id) {
                        d.name = name.clone();
                        d.phone = phone.clone();
                        d.active = *active;
                    }
                }
                Event::DriverRemoved { id } => {
                    engine.drivers.remove(id);
                }
                other => {
                    if let Some(date) = event_date(other) {
                        let day = engine.day_entry(date);
                        let mut guard = day.try_write().expect("replay: uncontended write");
                        apply_to_day(&mut guard, other, &engine.booking_dates);
                    }
                }
            }
        }
        metrics::gauge!(observability::FLEET_VEHICLES).set(engine.fleet.len() as f64);

        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                ack: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped ack".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// The ledger for a date, created lazily on first touch.
    pub(super) fn day_entry(&self, date: NaiveDate) -> SharedDayLedger {
        self.days
            .entry(date)
            .or_insert_with(|| Arc::new(RwLock::new(DayLedger::new(date))))
            .value()
            .clone()
    }

    /// The ledger for a date, or None if nothing was ever booked on it.
    pub fn day_ledger(&self, date: &NaiveDate) -> Option<SharedDayLedger> {
        self.days.get(date).map(|e| e.value().clone())
    }

    /// WAL-append + apply + notify in one call. Eliminates the repeated
    /// three-line pattern in the mutation path.
    pub(super) async fn persist_and_apply(
        &self,
        date: NaiveDate,
        ledger: &mut DayLedger,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_day(ledger, event, &self.booking_dates);
        self.notify.send(date, event);
        Ok(())
    }

    /// Lookup booking → date, get the day ledger, acquire its write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<(NaiveDate, tokio::sync::OwnedRwLockWriteGuard<DayLedger>), EngineError> {
        let date = self
            .booking_dates
            .get(booking_id)
            .map(|e| *e.value())
            .ok_or(EngineError::NotFound(*booking_id))?;
        let day = self
            .day_ledger(&date)
            .ok_or(EngineError::NotFound(*booking_id))?;
        let guard = day.write_owned().await;
        Ok((date, guard))
    }
}

/// Extract the ledger date from a booking event (None for fleet/driver events).
fn event_date(event: &Event) -> Option<NaiveDate> {
    match event {
        Event::BookingRequested { date, .. }
        | Event::VehicleAssigned { date, .. }
        | Event::BookingScheduled { date, .. }
        | Event::BookingConfirmed { date, .. }
        | Event::BookingCancelled { date, .. } => Some(*date),
        Event::VehicleAdded { .. }
        | Event::VehicleUpdated { .. }
        | Event::VehicleRemoved { .. }
        | Event::DriverAdded { .. }
        | Event::DriverUpdated { .. }
        | Event::DriverRemoved { .. } => None,
    }
}
