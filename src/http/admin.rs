use std::convert::Infallible;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{self, KeepAlive, Sse},
};
use chrono::{NaiveDate, NaiveTime};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_stream::wrappers::BroadcastStream;
use ulid::Ulid;

use crate::model::{Booking, Customer, Driver, PartySize, TripPlan, Vehicle};

use super::{ApiError, AppState};

fn parse_id(s: &str) -> Result<Ulid, ApiError> {
    Ulid::from_string(s).map_err(|_| ApiError::BadRequest("malformed id".into()))
}

fn parse_date(s: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest("date must be YYYY-MM-DD format".into()))
}

fn default_true() -> bool {
    true
}

// ── Fleet ────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleBody {
    name: String,
    seats: u32,
    reg_plate: String,
    #[serde(default = "default_true")]
    active: bool,
}

pub(super) async fn create_vehicle(
    State(state): State<AppState>,
    Json(body): Json<VehicleBody>,
) -> Result<(StatusCode, Json<Vehicle>), ApiError> {
    let id = Ulid::new();
    state
        .engine
        .add_vehicle(id, body.name.clone(), body.seats, body.reg_plate.clone(), body.active)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(Vehicle {
            id,
            name: body.name,
            seats: body.seats,
            reg_plate: body.reg_plate,
            active: body.active,
        }),
    ))
}

pub(super) async fn list_vehicles(State(state): State<AppState>) -> Json<Vec<Vehicle>> {
    Json(state.engine.list_vehicles())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleUpdateBody {
    name: String,
    seats: u32,
    active: bool,
}

pub(super) async fn update_vehicle(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<VehicleUpdateBody>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    state
        .engine
        .update_vehicle(id, body.name, body.seats, body.active)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn remove_vehicle(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    state.engine.remove_vehicle(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Drivers ──────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverBody {
    name: String,
    phone: Option<String>,
    #[serde(default = "default_true")]
    active: bool,
}

pub(super) async fn create_driver(
    State(state): State<AppState>,
    Json(body): Json<DriverBody>,
) -> Result<(StatusCode, Json<Driver>), ApiError> {
    let id = Ulid::new();
    state
        .engine
        .add_driver(id, body.name.clone(), body.phone.clone(), body.active)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(Driver {
            id,
            name: body.name,
            phone: body.phone,
            active: body.active,
        }),
    ))
}

pub(super) async fn list_drivers(State(state): State<AppState>) -> Json<Vec<Driver>> {
    Json(state.engine.list_drivers())
}

pub(super) async fn update_driver(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<DriverBody>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    state
        .engine
        .update_driver(id, body.name, body.phone, body.active)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn remove_driver(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    state.engine.remove_driver(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Bookings ─────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualBookingBody {
    date: String,
    party_size: String,
    customer_name: String,
    customer_email: String,
    customer_phone: Option<String>,
    tour: Option<String>,
    note: Option<String>,
}

/// Phone and walk-in bookings entered by the operator. No vehicle is decided
/// here; the booking consumes capacity as unassigned until `assign` runs.
pub(super) async fn create_manual_booking(
    State(state): State<AppState>,
    Json(body): Json<ManualBookingBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let date = parse_date(&body.date)?;
    let party = PartySize::from_token(&body.party_size)
        .ok_or_else(|| ApiError::BadRequest("partySize must be \"1-3\" or \"4-7\"".into()))?;
    let customer = Customer {
        name: body.customer_name.trim().to_string(),
        email: body.customer_email.trim().to_lowercase(),
        phone: body.customer_phone,
    };
    let id = state
        .engine
        .add_manual_booking(date, party, customer, body.tour, body.note)
        .await?;
    Ok((StatusCode::CREATED, Json(json!({ "bookingId": id.to_string() }))))
}

#[derive(Deserialize)]
pub struct DateParam {
    date: String,
}

pub(super) async fn list_bookings(
    State(state): State<AppState>,
    Query(params): Query<DateParam>,
) -> Result<Json<Vec<Booking>>, ApiError> {
    let date = parse_date(&params.date)?;
    Ok(Json(state.engine.bookings_for_date(date).await))
}

pub(super) async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Booking>, ApiError> {
    let id = parse_id(&id)?;
    state
        .engine
        .get_booking(id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("not found: {id}")))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignBody {
    /// Omit to let the engine pick the smallest fitting free vehicle.
    #[serde(default)]
    vehicle_id: Option<String>,
}

pub(super) async fn assign_vehicle(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<AssignBody>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id)?;
    let vehicle = body.vehicle_id.as_deref().map(parse_id).transpose()?;
    let chosen = state.engine.assign_vehicle(id, vehicle).await?;
    Ok(Json(json!({ "vehicleId": chosen.to_string() })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleBody {
    pickup_time: String,
    pickup: String,
    dropoff: String,
    passengers: u32,
    driver_id: String,
}

pub(super) async fn schedule_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ScheduleBody>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    let pickup_time = NaiveTime::parse_from_str(&body.pickup_time, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(&body.pickup_time, "%H:%M"))
        .map_err(|_| ApiError::BadRequest("pickupTime must be HH:MM".into()))?;
    let plan = TripPlan {
        pickup_time,
        pickup: body.pickup,
        dropoff: body.dropoff,
        passengers: body.passengers,
        driver: parse_id(&body.driver_id)?,
    };
    state.engine.schedule_booking(id, plan).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn confirm_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    state.engine.confirm_booking(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn cancel_booking(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    state.engine.cancel_booking(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Change feed ──────────────────────────────────────────

/// SSE stream of one date's ledger events, for the operator dashboard.
pub(super) async fn event_feed(
    State(state): State<AppState>,
    Query(params): Query<DateParam>,
) -> Result<Sse<impl Stream<Item = Result<sse::Event, Infallible>>>, ApiError> {
    let date = parse_date(&params.date)?;
    let rx = state.engine.notify.subscribe(date);
    let stream = BroadcastStream::new(rx).filter_map(|msg| {
        std::future::ready(match msg {
            Ok(event) => sse::Event::default().json_data(&event).ok().map(Ok),
            // Lagged subscriber: skip what was missed, keep streaming.
            Err(_) => None,
        })
    });
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
