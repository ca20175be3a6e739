// ── API-to-domain type conversions ──
//
// Bridges raw `bookly_api` response types into canonical domain types.
// Each conversion normalizes field shapes, parses wall-clock strings
// into strong types, resolves the schedule through the three-tier merge,
// and fills sensible defaults for missing optional data.

use chrono::{NaiveDate, NaiveTime};

use bookly_api::types::{WireActivity, WireSchedulePatch, WireSession, WireTicketType, WireVenue};

use crate::model::{
    activity::difficulty_from_legacy, Activity, SchedulePatch, ScheduleRule, Session, TicketType,
    Venue,
};

// ── Helpers ────────────────────────────────────────────────────────

fn parse_time(raw: Option<&String>) -> Option<NaiveTime> {
    raw.and_then(|s| NaiveTime::parse_from_str(s.trim(), "%H:%M").ok())
}

fn parse_dates(raw: &[String]) -> std::collections::BTreeSet<NaiveDate> {
    raw.iter()
        .filter_map(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
        .collect()
}

fn clamp_u32(n: i64) -> u32 {
    u32::try_from(n.max(0)).unwrap_or(u32::MAX)
}

// ── Schedule ───────────────────────────────────────────────────────

impl From<WireSchedulePatch> for SchedulePatch {
    fn from(w: WireSchedulePatch) -> Self {
        Self {
            operating_days: w.operating_days,
            start_time: parse_time(w.start_time.as_ref()),
            end_time: parse_time(w.end_time.as_ref()),
            slot_interval_minutes: w.slot_interval_minutes.map(clamp_u32),
            advance_booking_minutes: w.advance_booking_minutes.map(clamp_u32),
        }
    }
}

/// The activity's own schedule fields as a patch (highest tier).
fn activity_patch(w: &WireActivity) -> SchedulePatch {
    SchedulePatch {
        operating_days: w.operating_days.clone(),
        start_time: parse_time(w.start_time.as_ref()),
        end_time: parse_time(w.end_time.as_ref()),
        slot_interval_minutes: w.slot_interval_minutes.map(clamp_u32),
        advance_booking_minutes: w.advance_booking_minutes.map(clamp_u32),
    }
}

// ── Venue ──────────────────────────────────────────────────────────

impl From<WireVenue> for Venue {
    fn from(w: WireVenue) -> Self {
        Self {
            id: w.id,
            name: w.name,
            organization_id: w.organization_id,
            timezone: w.timezone,
            utc_offset_minutes: w.utc_offset_minutes,
            currency: w.currency,
            fee_rate: w.fee_rate,
            schedule_defaults: w.schedule_defaults.map(Into::into),
        }
    }
}

// ── Activity ───────────────────────────────────────────────────────

/// Convert a wire activity, resolving its schedule against the venue's
/// organization-level defaults: built-in < organization < activity.
pub fn activity_from_wire(w: WireActivity, venue: &Venue) -> Activity {
    let patch = activity_patch(&w);
    let schedule = ScheduleRule::resolve(venue.schedule_defaults.as_ref(), Some(&patch));

    Activity {
        id: w.id,
        organization_id: w
            .organization_id
            .unwrap_or_else(|| venue.organization_id.clone()),
        name: w.name,
        capacity: clamp_u32(w.capacity),
        base_price_cents: w.base_price_cents,
        duration_minutes: clamp_u32(w.duration_minutes.max(1)),
        schedule,
        blocked_dates: parse_dates(&w.blocked_dates),
        custom_available_dates: parse_dates(&w.custom_available_dates),
        timezone: w.timezone.or_else(|| venue.timezone.clone()),
        utc_offset_minutes: w.utc_offset_minutes,
        difficulty: w.difficulty.as_ref().and_then(difficulty_from_legacy),
        active: w.active,
        ticket_types: w.ticket_types.into_iter().map(TicketType::from).collect(),
    }
}

impl From<WireTicketType> for TicketType {
    fn from(w: WireTicketType) -> Self {
        Self {
            id: w.id,
            label: w.label,
            price_cents: w.price_cents,
        }
    }
}

// ── Session ────────────────────────────────────────────────────────

impl From<WireSession> for Session {
    fn from(w: WireSession) -> Self {
        Self {
            activity_id: w.activity_id.unwrap_or_default(),
            id: w.id,
            start_time: w.start_time,
            capacity_remaining: w.capacity_remaining,
            capacity_total: w.capacity_total,
        }
    }
}
