// ── Legacy cache migration ──
//
// Older widget builds persisted bare entity arrays under unversioned
// keys: first a global flat key per kind ("activities"), later a
// scope-prefixed one ("{org}:activities"). This module owns the ordered
// candidate-source list and the per-kind normalizers that lift those
// payloads into canonical envelopes.
//
// Normalization is lenient by design: numeric fields coerce from
// strings, categorical encodings map onto the current scales, missing
// structural fields take documented defaults, and records without a
// usable identifier are dropped. Reads never throw.

use chrono::{NaiveDate, NaiveTime};
use serde_json::Value;

use super::{EntityKind, StoreEntity};
use crate::model::{
    activity::difficulty_from_legacy, Activity, Booking, BookingStatus, DiscountKind, GiftCard,
    PromoCode, ScheduleRule, TicketLine, TicketType,
};

/// One candidate legacy source: a storage key expected to hold a bare
/// JSON array of records.
#[derive(Debug, Clone)]
pub struct LegacySource {
    pub key: String,
}

/// The ordered fallback chain for a kind: older global flat-array key
/// first, then the scope-prefixed key. Queried in priority order until
/// one yields valid data.
pub fn default_sources(kind: EntityKind, organization_id: &str) -> Vec<LegacySource> {
    vec![
        LegacySource {
            key: kind.to_string(),
        },
        LegacySource {
            key: format!("{organization_id}:{kind}"),
        },
    ]
}

// ── Value coercion helpers ───────────────────────────────────────────

pub(crate) fn field<'a>(value: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| value.get(name))
}

/// String, or number rendered as a string.
pub(crate) fn coerce_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Number, or numeric string.
pub(crate) fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok().or_else(|| {
            s.trim()
                .parse::<f64>()
                .ok()
                .map(|f| f.round() as i64)
        }),
        _ => None,
    }
}

pub(crate) fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn coerce_u32(value: &Value) -> Option<u32> {
    coerce_i64(value).and_then(|n| u32::try_from(n).ok())
}

pub(crate) fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Some(true),
            "false" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

pub(crate) fn coerce_date(value: &Value) -> Option<NaiveDate> {
    value
        .as_str()
        .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
}

/// "HH:MM" first, then the 12-hour display format.
pub(crate) fn coerce_time(value: &Value) -> Option<NaiveTime> {
    let s = value.as_str()?.trim();
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%I:%M %p"))
        .ok()
}

/// Money field: `*_cents` names hold integers, bare names hold dollars.
fn coerce_cents(value: &Value, cents_names: &[&str], dollar_names: &[&str]) -> Option<i64> {
    if let Some(v) = field(value, cents_names).and_then(coerce_i64) {
        return Some(v);
    }
    field(value, dollar_names)
        .and_then(coerce_f64)
        .map(|dollars| (dollars * 100.0).round() as i64)
}

fn entity_id(value: &Value) -> Option<String> {
    field(value, &["id", "_id"]).and_then(coerce_string)
}

// ── Per-kind normalizers ─────────────────────────────────────────────

impl StoreEntity for Activity {
    const KIND: EntityKind = EntityKind::Activities;

    fn entity_id(&self) -> &str {
        &self.id
    }

    fn from_legacy(value: &Value) -> Option<Self> {
        let id = entity_id(value)?;

        let mut schedule = ScheduleRule::default();
        if let Some(days) = field(value, &["operating_days", "days"]).and_then(Value::as_array) {
            schedule.operating_days = days
                .iter()
                .filter_map(coerce_u32)
                .filter_map(|d| u8::try_from(d).ok())
                .collect();
        }
        if let Some(start) = field(value, &["start_time", "open"]).and_then(coerce_time) {
            schedule.start_time = start;
        }
        if let Some(end) = field(value, &["end_time", "close"]).and_then(coerce_time) {
            schedule.end_time = end;
        }
        if let Some(interval) =
            field(value, &["slot_interval_minutes", "interval"]).and_then(coerce_u32)
        {
            schedule.slot_interval_minutes = interval;
        }
        if let Some(advance) =
            field(value, &["advance_booking_minutes", "advance"]).and_then(coerce_u32)
        {
            schedule.advance_booking_minutes = advance;
        }

        let ticket_types = field(value, &["ticket_types"])
            .and_then(Value::as_array)
            .map(|types| {
                types
                    .iter()
                    .filter_map(|t| {
                        Some(TicketType {
                            id: entity_id(t)?,
                            label: field(t, &["label", "name"])
                                .and_then(coerce_string)
                                .unwrap_or_default(),
                            price_cents: coerce_cents(t, &["price_cents"], &["price"])?,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            id,
            organization_id: field(value, &["organization_id", "org_id"])
                .and_then(coerce_string)
                .unwrap_or_default(),
            name: field(value, &["name", "title"])
                .and_then(coerce_string)
                .unwrap_or_else(|| "Untitled activity".into()),
            capacity: field(value, &["capacity"]).and_then(coerce_u32).unwrap_or(0),
            base_price_cents: coerce_cents(value, &["base_price_cents", "price_cents"], &["base_price", "price"])
                .unwrap_or(0),
            duration_minutes: field(value, &["duration_minutes", "duration"])
                .and_then(coerce_u32)
                .unwrap_or(60),
            schedule,
            blocked_dates: field(value, &["blocked_dates", "blockedDates"])
                .and_then(Value::as_array)
                .map(|dates| dates.iter().filter_map(coerce_date).collect())
                .unwrap_or_default(),
            custom_available_dates: field(value, &["custom_available_dates", "custom_dates"])
                .and_then(Value::as_array)
                .map(|dates| dates.iter().filter_map(coerce_date).collect())
                .unwrap_or_default(),
            timezone: field(value, &["timezone"]).and_then(coerce_string),
            utc_offset_minutes: field(value, &["utc_offset_minutes"])
                .and_then(coerce_i64)
                .and_then(|n| i32::try_from(n).ok()),
            difficulty: field(value, &["difficulty"]).and_then(difficulty_from_legacy),
            active: field(value, &["active", "enabled"])
                .and_then(coerce_bool)
                .unwrap_or(true),
            ticket_types,
        })
    }
}

impl StoreEntity for Booking {
    const KIND: EntityKind = EntityKind::Bookings;

    fn entity_id(&self) -> &str {
        &self.id
    }

    fn from_legacy(value: &Value) -> Option<Self> {
        let id = entity_id(value)?;
        // A booking with no date can never match a slot query; dropping
        // it beats inventing one.
        let date = field(value, &["date"]).and_then(coerce_date)?;

        // Legacy bookings were single-line: one ticket type, a
        // participant count, and a unit price.
        let tickets = vec![TicketLine {
            ticket_type_id: field(value, &["ticket_type_id", "ticketTypeId"])
                .and_then(coerce_string)
                .unwrap_or_else(|| "general".into()),
            quantity: field(value, &["participants", "quantity", "party_size"])
                .and_then(coerce_u32)
                .unwrap_or(1),
            unit_price_cents: coerce_cents(value, &["unit_price_cents"], &["unit_price", "price"])
                .unwrap_or(0),
        }];

        let status = field(value, &["status"])
            .and_then(Value::as_str)
            .map_or(BookingStatus::Confirmed, |s| {
                match s.to_ascii_lowercase().as_str() {
                    "pending" | "reserved" => BookingStatus::Pending,
                    "cancelled" | "canceled" => BookingStatus::Cancelled,
                    _ => BookingStatus::Confirmed,
                }
            });

        Some(Self {
            id,
            activity_id: field(value, &["activity_id", "activityId"])
                .and_then(coerce_string)
                .unwrap_or_default(),
            date,
            time: field(value, &["time"])
                .and_then(coerce_string)
                .unwrap_or_default(),
            tickets,
            promo_code: field(value, &["promo_code", "promoCode"]).and_then(coerce_string),
            session_id: field(value, &["session_id", "sessionId"]).and_then(coerce_string),
            status,
            created_at: chrono::Utc::now(),
        })
    }
}

impl StoreEntity for GiftCard {
    const KIND: EntityKind = EntityKind::Vouchers;

    fn entity_id(&self) -> &str {
        &self.id
    }

    fn from_legacy(value: &Value) -> Option<Self> {
        let id = entity_id(value)?;
        Some(Self {
            id,
            code: field(value, &["code"]).and_then(coerce_string).unwrap_or_default(),
            balance_cents: coerce_cents(value, &["balance_cents"], &["balance", "amount"])
                .unwrap_or(0),
            expires_at: field(value, &["expires_at", "expiresAt"])
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok()),
        })
    }
}

impl StoreEntity for PromoCode {
    const KIND: EntityKind = EntityKind::PromoCodes;

    fn entity_id(&self) -> &str {
        &self.id
    }

    fn from_legacy(value: &Value) -> Option<Self> {
        let id = entity_id(value)?;

        // Legacy encodings: a bare percentage under "rate"/"percent", or
        // a fixed dollar amount under "amount".
        let kind = if let Some(rate) =
            field(value, &["rate", "percent", "percent_off"]).and_then(coerce_f64)
        {
            DiscountKind::Percent(rate)
        } else if let Some(cents) =
            coerce_cents(value, &["amount_off_cents"], &["amount", "amount_off"])
        {
            DiscountKind::Fixed(cents)
        } else {
            return None;
        };

        Some(Self {
            id,
            code: field(value, &["code"]).and_then(coerce_string)?,
            kind,
            ticket_type_id: field(value, &["ticket_type_id", "ticketTypeId"])
                .and_then(coerce_string),
            starts_at: field(value, &["starts_at", "startsAt"])
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok()),
            expires_at: field(value, &["expires_at", "expiresAt"])
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok()),
            max_uses: field(value, &["max_uses", "maxUses"]).and_then(coerce_u32),
            used_count: field(value, &["used_count", "usedCount"])
                .and_then(coerce_u32)
                .unwrap_or(0),
            active: field(value, &["active"]).and_then(coerce_bool).unwrap_or(true),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sources_are_ordered_global_then_scoped() {
        let sources = default_sources(EntityKind::Activities, "org_1");
        assert_eq!(sources[0].key, "activities");
        assert_eq!(sources[1].key, "org_1:activities");
    }

    #[test]
    fn activity_coerces_strings_and_maps_difficulty() {
        let raw = json!({
            "_id": 42,
            "title": "The Vault",
            "capacity": "8",
            "price": "35.00",
            "duration": "60",
            "days": ["4", 5, 6],
            "open": "10:00",
            "close": "10:00 PM",
            "interval": 90,
            "difficulty": "hard",
            "blockedDates": ["2025-12-25", "not-a-date"]
        });

        let activity = Activity::from_legacy(&raw).unwrap();
        assert_eq!(activity.id, "42");
        assert_eq!(activity.name, "The Vault");
        assert_eq!(activity.capacity, 8);
        assert_eq!(activity.base_price_cents, 3500);
        assert_eq!(activity.schedule.operating_days, vec![4, 5, 6]);
        assert_eq!(activity.schedule.slot_interval_minutes, 90);
        assert_eq!(
            activity.schedule.end_time,
            NaiveTime::from_hms_opt(22, 0, 0).unwrap()
        );
        assert_eq!(activity.difficulty, Some(4));
        // Unparseable dates are silently dropped, parseable ones kept.
        assert_eq!(activity.blocked_dates.len(), 1);
    }

    #[test]
    fn activity_without_id_is_dropped() {
        assert!(Activity::from_legacy(&json!({ "name": "ghost" })).is_none());
    }

    #[test]
    fn activity_fills_structural_defaults() {
        let activity = Activity::from_legacy(&json!({ "id": "a1" })).unwrap();
        assert_eq!(activity.capacity, 0);
        assert_eq!(activity.duration_minutes, 60);
        assert!(activity.active);
        assert_eq!(activity.schedule, ScheduleRule::default());
    }

    #[test]
    fn booking_normalizes_single_line_shape() {
        let raw = json!({
            "id": "b1",
            "activityId": "a1",
            "date": "2025-11-20",
            "time": "10:00 AM",
            "participants": 5,
            "unit_price": 35.0,
            "status": "confirmed"
        });

        let booking = Booking::from_legacy(&raw).unwrap();
        assert_eq!(booking.party_size(), 5);
        assert_eq!(booking.tickets[0].unit_price_cents, 3500);
        assert_eq!(booking.status, BookingStatus::Confirmed);
    }

    #[test]
    fn booking_without_date_is_dropped() {
        assert!(Booking::from_legacy(&json!({ "id": "b1" })).is_none());
    }

    #[test]
    fn promo_reads_rate_or_amount() {
        let pct = PromoCode::from_legacy(&json!({ "id": "p1", "code": "SAVE15", "rate": 15 })).unwrap();
        assert_eq!(pct.kind, DiscountKind::Percent(15.0));

        let fixed =
            PromoCode::from_legacy(&json!({ "id": "p2", "code": "TENOFF", "amount": "10.00" }))
                .unwrap();
        assert_eq!(fixed.kind, DiscountKind::Fixed(1000));

        assert!(PromoCode::from_legacy(&json!({ "id": "p3", "code": "NOOP" })).is_none());
    }

    #[test]
    fn gift_card_coerces_dollar_balance() {
        let card = GiftCard::from_legacy(&json!({ "id": "g1", "code": "GC-1", "balance": 50 }))
            .unwrap();
        assert_eq!(card.balance_cents, 5000);
    }
}
