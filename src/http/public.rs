use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::model::{Customer, PartySize};
use crate::observability;

use super::{ApiError, AppState};

/// Shown whenever a date has no remaining capacity, pointing the customer
/// at the fallback contact channel.
pub const FULLY_BOOKED_MESSAGE: &str =
    "We're fully booked on this date. Please contact us — we may be able to arrange an alternative.";

const REASON_FULLY_BOOKED: &str = "fully_booked";
const RECEIVED_MESSAGE: &str = "Booking request received. We will contact you shortly.";

// ── GET /api/public/availability ─────────────────────────

#[derive(Deserialize)]
pub struct AvailabilityParams {
    month: Option<String>,
    #[serde(rename = "partySize")]
    party_size: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityResponse {
    month: String,
    party_size: &'static str,
    disabled_dates: Vec<DisabledDate>,
    fully_booked_message: &'static str,
}

#[derive(Serialize)]
struct DisabledDate {
    date: String,
    reason: &'static str,
}

/// The calendar widget's pre-filter: which dates of the month should be
/// greyed out for this party size. Advisory only; submission re-checks.
pub(super) async fn availability(
    State(state): State<AppState>,
    Query(params): Query<AvailabilityParams>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    let month_raw = params.month.unwrap_or_default();
    let (year, month) = parse_month(&month_raw).ok_or_else(|| {
        ApiError::BadRequest("month parameter is required in YYYY-MM format".into())
    })?;
    let party = params
        .party_size
        .as_deref()
        .and_then(PartySize::from_token)
        .ok_or_else(|| {
            ApiError::BadRequest("partySize parameter is required (\"1-3\" or \"4-7\")".into())
        })?;

    let fully_booked = state.engine.scan_month(year, month, party).await?;

    Ok(Json(AvailabilityResponse {
        month: month_raw,
        party_size: party.token(),
        disabled_dates: fully_booked
            .iter()
            .map(|d| DisabledDate {
                date: d.format("%Y-%m-%d").to_string(),
                reason: REASON_FULLY_BOOKED,
            })
            .collect(),
        fully_booked_message: FULLY_BOOKED_MESSAGE,
    }))
}

fn parse_month(s: &str) -> Option<(i32, u32)> {
    let (y, m) = s.split_once('-')?;
    if y.len() != 4 || m.len() != 2 {
        return None;
    }
    let year: i32 = y.parse().ok()?;
    let month: u32 = m.parse().ok()?;
    (1..=12).contains(&month).then_some((year, month))
}

// ── POST /api/public/bookings ────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingRequestBody {
    date: String,
    party_size: String,
    customer_name: String,
    customer_email: String,
    customer_phone: Option<String>,
    tour: Option<String>,
    message: Option<String>,
    // Honeypot fields: real customers never fill these.
    website: Option<String>,
    url: Option<String>,
    honeypot: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingCreated {
    success: bool,
    booking_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    vehicle_id: Option<String>,
    message: &'static str,
}

/// Submission endpoint. The engine re-runs the matcher under the date lock,
/// so a date the calendar still showed as free can legitimately come back
/// fully booked here; that check is the authoritative one.
pub(super) async fn create_booking(
    State(state): State<AppState>,
    Json(body): Json<BookingRequestBody>,
) -> Result<(StatusCode, Json<BookingCreated>), ApiError> {
    let trapped = [&body.website, &body.url, &body.honeypot]
        .iter()
        .any(|f| f.as_ref().is_some_and(|v| !v.is_empty()));
    if trapped {
        metrics::counter!(observability::PUBLIC_REJECTED_TOTAL, "reason" => "honeypot")
            .increment(1);
        // Bots get a convincing success and no booking.
        return Ok((
            StatusCode::CREATED,
            Json(BookingCreated {
                success: true,
                booking_id: Ulid::nil().to_string(),
                vehicle_id: None,
                message: RECEIVED_MESSAGE,
            }),
        ));
    }

    let date = NaiveDate::parse_from_str(&body.date, "%Y-%m-%d")
        .map_err(|_| ApiError::BadRequest("date must be YYYY-MM-DD format".into()))?;
    let party = PartySize::from_token(&body.party_size)
        .ok_or_else(|| ApiError::BadRequest("partySize must be \"1-3\" or \"4-7\"".into()))?;

    let customer = Customer {
        name: body.customer_name.trim().to_string(),
        email: body.customer_email.trim().to_lowercase(),
        phone: body.customer_phone,
    };
    let note = body
        .message
        .map(|m| m.trim().to_string())
        .filter(|m| !m.is_empty());

    let (booking_id, vehicle_id) = state
        .engine
        .request_booking(date, party, customer, body.tour, note)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(BookingCreated {
            success: true,
            booking_id: booking_id.to_string(),
            vehicle_id: Some(vehicle_id.to_string()),
            message: RECEIVED_MESSAGE,
        }),
    ))
}
