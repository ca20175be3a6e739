// ── Activity and schedule types ──

use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// A bookable experience: capacity, price, duration, and the recurrence
/// schedule its slots are generated from when no backend session exists.
///
/// Schedule times are wall-clock values in the activity's (or venue's)
/// timezone, never absolute instants -- results must be stable regardless
/// of the viewer's local timezone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    /// Maximum participants per slot. Zero is legal: every slot renders
    /// with `available = false`.
    pub capacity: u32,
    pub base_price_cents: i64,
    pub duration_minutes: u32,
    pub schedule: ScheduleRule,
    /// ISO dates with no bookable slots, ever. Blocked always wins.
    #[serde(default)]
    pub blocked_dates: BTreeSet<NaiveDate>,
    /// Explicit allow-list: bookable regardless of operating days.
    #[serde(default)]
    pub custom_available_dates: BTreeSet<NaiveDate>,
    /// IANA-style label, informational only.
    #[serde(default)]
    pub timezone: Option<String>,
    /// Wall-clock offset override; falls back to the venue offset.
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
    /// 1 (beginner) ..= 5 (expert) on the current scale.
    #[serde(default)]
    pub difficulty: Option<u8>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub ticket_types: Vec<TicketType>,
}

fn default_true() -> bool {
    true
}

impl Activity {
    /// Wall-clock offset used for schedule computation, activity override
    /// first, venue fallback second.
    pub fn effective_offset_minutes(&self, venue_offset_minutes: i32) -> i32 {
        self.utc_offset_minutes.unwrap_or(venue_offset_minutes)
    }
}

/// Purchasable ticket tier within an activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketType {
    pub id: String,
    pub label: String,
    pub price_cents: i64,
}

// ── Schedule ─────────────────────────────────────────────────────────

/// Recurrence rule slots are generated from.
///
/// `operating_days` uses 0 = Monday .. 6 = Sunday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRule {
    pub operating_days: Vec<u8>,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub slot_interval_minutes: u32,
    /// Minimum lead time before a same-day slot can still be booked.
    pub advance_booking_minutes: u32,
}

impl Default for ScheduleRule {
    /// Built-in defaults: open every day, 09:00-17:00, hourly slots,
    /// no same-day lead time. The lowest tier of the merge order.
    fn default() -> Self {
        Self {
            operating_days: (0..7).collect(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            end_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or_default(),
            slot_interval_minutes: 60,
            advance_booking_minutes: 0,
        }
    }
}

impl ScheduleRule {
    /// Resolve the effective schedule from the documented merge order:
    /// built-in defaults < organization defaults < per-activity override.
    pub fn resolve(organization: Option<&SchedulePatch>, activity: Option<&SchedulePatch>) -> Self {
        let mut rule = Self::default();
        if let Some(patch) = organization {
            rule.apply(patch);
        }
        if let Some(patch) = activity {
            rule.apply(patch);
        }
        rule
    }

    fn apply(&mut self, patch: &SchedulePatch) {
        if let Some(ref days) = patch.operating_days {
            self.operating_days = days.clone();
        }
        if let Some(start) = patch.start_time {
            self.start_time = start;
        }
        if let Some(end) = patch.end_time {
            self.end_time = end;
        }
        if let Some(interval) = patch.slot_interval_minutes {
            self.slot_interval_minutes = interval;
        }
        if let Some(advance) = patch.advance_booking_minutes {
            self.advance_booking_minutes = advance;
        }
    }

    /// Whether the rule operates on the given weekday (0 = Monday).
    pub fn operates_on(&self, weekday_index: u8) -> bool {
        self.operating_days.contains(&weekday_index)
    }
}

/// One tier of schedule configuration: named optional fields, merged in
/// a fixed order by [`ScheduleRule::resolve`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulePatch {
    #[serde(default)]
    pub operating_days: Option<Vec<u8>>,
    #[serde(default)]
    pub start_time: Option<NaiveTime>,
    #[serde(default)]
    pub end_time: Option<NaiveTime>,
    #[serde(default)]
    pub slot_interval_minutes: Option<u32>,
    #[serde(default)]
    pub advance_booking_minutes: Option<u32>,
}

// ── Difficulty normalization ─────────────────────────────────────────

/// Map legacy difficulty encodings to the current 1-5 scale.
///
/// Older payloads used either category strings ("beginner", "hard") or a
/// 0-10 numeric scale; current payloads use 1-5 directly.
pub(crate) fn difficulty_from_legacy(value: &serde_json::Value) -> Option<u8> {
    if let Some(s) = value.as_str() {
        match s.to_ascii_lowercase().as_str() {
            "beginner" | "easy" => return Some(1),
            "casual" => return Some(2),
            "medium" | "intermediate" => return Some(3),
            "hard" | "challenging" => return Some(4),
            "expert" | "extreme" => return Some(5),
            // Not a category label; fall through to numeric parsing.
            _ => {}
        }
    }

    let n = value.as_i64().or_else(|| {
        value
            .as_str()
            .and_then(|s| s.trim().parse::<i64>().ok())
    })?;

    match n {
        1..=5 => Some(u8::try_from(n).ok()?),
        // 0-10 legacy scale, compressed onto 1-5.
        6..=10 => Some(u8::try_from((n + 1) / 2).ok()?),
        0 => Some(1),
        _ => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolve_uses_builtin_defaults_when_no_patches() {
        let rule = ScheduleRule::resolve(None, None);
        assert_eq!(rule, ScheduleRule::default());
        assert_eq!(rule.slot_interval_minutes, 60);
    }

    #[test]
    fn organization_patch_overrides_builtin() {
        let org = SchedulePatch {
            start_time: NaiveTime::from_hms_opt(10, 0, 0),
            slot_interval_minutes: Some(90),
            ..SchedulePatch::default()
        };
        let rule = ScheduleRule::resolve(Some(&org), None);
        assert_eq!(rule.start_time, NaiveTime::from_hms_opt(10, 0, 0).unwrap());
        assert_eq!(rule.slot_interval_minutes, 90);
        // Untouched fields keep the built-in default.
        assert_eq!(rule.end_time, NaiveTime::from_hms_opt(17, 0, 0).unwrap());
    }

    #[test]
    fn activity_patch_wins_over_organization() {
        let org = SchedulePatch {
            slot_interval_minutes: Some(90),
            advance_booking_minutes: Some(120),
            ..SchedulePatch::default()
        };
        let act = SchedulePatch {
            slot_interval_minutes: Some(30),
            ..SchedulePatch::default()
        };
        let rule = ScheduleRule::resolve(Some(&org), Some(&act));
        assert_eq!(rule.slot_interval_minutes, 30);
        // Organization tier still applies where the activity is silent.
        assert_eq!(rule.advance_booking_minutes, 120);
    }

    #[test]
    fn difficulty_maps_category_strings() {
        assert_eq!(difficulty_from_legacy(&json!("beginner")), Some(1));
        assert_eq!(difficulty_from_legacy(&json!("Hard")), Some(4));
        assert_eq!(difficulty_from_legacy(&json!("extreme")), Some(5));
        assert_eq!(difficulty_from_legacy(&json!("unrated")), None);
    }

    #[test]
    fn difficulty_compresses_ten_point_scale() {
        assert_eq!(difficulty_from_legacy(&json!(0)), Some(1));
        assert_eq!(difficulty_from_legacy(&json!(3)), Some(3));
        assert_eq!(difficulty_from_legacy(&json!(7)), Some(4));
        assert_eq!(difficulty_from_legacy(&json!(10)), Some(5));
        assert_eq!(difficulty_from_legacy(&json!(42)), None);
    }

    #[test]
    fn difficulty_accepts_numeric_strings() {
        assert_eq!(difficulty_from_legacy(&json!("4")), Some(4));
    }
}
