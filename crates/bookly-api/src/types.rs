// Booking backend response types
//
// Models for the backend's widget-facing JSON API. All responses are wrapped
// in the `ApiEnvelope<T>` wrapper. Fields use `#[serde(default)]` liberally
// because older backend deployments are inconsistent about field presence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Response Envelope ────────────────────────────────────────────────

/// Standard backend response envelope.
///
/// Every endpoint wraps its payload:
/// ```json
/// { "data": ..., "error": null }
/// { "data": null, "error": { "code": "...", "message": "..." } }
/// ```
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<ApiError>,
}

/// Structured error from the envelope. Presence means the request failed.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: Option<String>,
    pub message: String,
}

// ── Venue ────────────────────────────────────────────────────────────

/// Venue record from `venues/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireVenue {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub organization_id: String,
    /// IANA-style timezone label, informational only.
    #[serde(default)]
    pub timezone: Option<String>,
    /// Offset applied to UTC to obtain the venue's wall clock.
    #[serde(default)]
    pub utc_offset_minutes: i32,
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Platform fee rate, e.g. `0.06` for 6%.
    #[serde(default)]
    pub fee_rate: f64,
    /// Organization-level schedule defaults (middle tier of the merge).
    #[serde(default)]
    pub schedule_defaults: Option<WireSchedulePatch>,
    /// Catch-all for undocumented fields.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_currency() -> String {
    "USD".into()
}

// ── Activity ─────────────────────────────────────────────────────────

/// Activity record from `venues/{id}/activities`.
///
/// The backend can return many more fields per activity than the widget
/// needs. We model the commonly needed ones explicitly; everything else
/// lands in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireActivity {
    pub id: String,
    #[serde(default)]
    pub venue_id: Option<String>,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub capacity: i64,
    #[serde(default)]
    pub base_price_cents: i64,
    #[serde(default)]
    pub duration_minutes: i64,
    /// 0 = Monday .. 6 = Sunday.
    #[serde(default)]
    pub operating_days: Option<Vec<u8>>,
    /// Wall-clock "HH:MM".
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub slot_interval_minutes: Option<i64>,
    #[serde(default)]
    pub advance_booking_minutes: Option<i64>,
    /// ISO dates with no bookable slots, ever.
    #[serde(default)]
    pub blocked_dates: Vec<String>,
    /// ISO dates bookable regardless of operating days.
    #[serde(default)]
    pub custom_available_dates: Vec<String>,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
    /// Difficulty on the backend's current 1–5 scale.
    #[serde(default)]
    pub difficulty: Option<serde_json::Value>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub ticket_types: Vec<WireTicketType>,
    /// Catch-all for undocumented fields.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_true() -> bool {
    true
}

/// Purchasable ticket tier within an activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireTicketType {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub price_cents: i64,
}

/// Partial schedule shape used for organization-level defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WireSchedulePatch {
    #[serde(default)]
    pub operating_days: Option<Vec<u8>>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub slot_interval_minutes: Option<i64>,
    #[serde(default)]
    pub advance_booking_minutes: Option<i64>,
}

// ── Session ──────────────────────────────────────────────────────────

/// Backend-authoritative session from `activities/{id}/sessions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireSession {
    pub id: String,
    #[serde(default)]
    pub activity_id: Option<String>,
    /// Absolute start instant; rendered as venue wall-clock by the core.
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub capacity_remaining: i64,
    #[serde(default)]
    pub capacity_total: i64,
    /// Catch-all for undocumented fields.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ── Discount validation ──────────────────────────────────────────────

/// Result of `discounts/promo/validate`.
#[derive(Debug, Clone, Deserialize)]
pub struct PromoValidation {
    pub valid: bool,
    /// Percentage off, e.g. `15.0`.
    #[serde(default)]
    pub percent_off: Option<f64>,
    /// Fixed amount off in cents.
    #[serde(default)]
    pub amount_off_cents: Option<i64>,
    /// When present the promo is scoped to a single ticket type.
    #[serde(default)]
    pub ticket_type_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Result of `discounts/gift-card/validate`.
#[derive(Debug, Clone, Deserialize)]
pub struct GiftCardValidation {
    pub valid: bool,
    #[serde(default)]
    pub balance_cents: i64,
    #[serde(default)]
    pub message: Option<String>,
}

// ── Checkout ─────────────────────────────────────────────────────────

/// Sanitized customer contact forwarded to the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutContact {
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// Reservation creation payload for `checkouts`.
///
/// `session_id` present means live-session mode: the backend atomically
/// decrements that session's remaining capacity. Absent means template
/// mode: the backend creates the reservation from scratch.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutRequest {
    pub venue_id: String,
    pub activity_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// ISO date, e.g. `"2025-11-20"`.
    pub date: String,
    /// 24-hour wall-clock, e.g. `"10:00"`.
    pub start_time: String,
    pub end_time: String,
    pub party_size: u32,
    pub contact: CheckoutContact,
    pub total_cents: i64,
    /// Opaque payment price reference for the gateway.
    pub price_ref: String,
}

/// Successful checkout hand-off.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutResponse {
    pub redirect_url: String,
}

/// Backend error code signalling the selected slot filled up between
/// selection and submission.
pub const CODE_CAPACITY_EXHAUSTED: &str = "checkout.capacity_exhausted";
