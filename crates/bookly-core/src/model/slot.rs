// ── Derived slot values ──
//
// Slots are ephemeral: computed by the availability engine, handed to the
// wizard, never persisted. Sessions are their backend-authoritative
// counterpart with live capacity tracking.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// A concrete bookable opportunity for an activity on a specific date.
///
/// Invariants: `spots = max(0, capacity − consumed)`;
/// `available ⇔ spots > 0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    /// 12-hour wall-clock label shown to and chosen by the user,
    /// e.g. `"10:00 AM"`.
    pub time: String,
    /// Same instant as `time`, kept for ordering and arithmetic.
    pub start: NaiveTime,
    pub available: bool,
    pub spots: u32,
    /// Present only when sourced from a live backend session.
    #[serde(default)]
    pub session_id: Option<String>,
}

/// A backend-authoritative slot instance with live capacity tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub activity_id: String,
    pub start_time: DateTime<Utc>,
    pub capacity_remaining: i64,
    pub capacity_total: i64,
}

// ── Wall-clock formatting ────────────────────────────────────────────

/// Render a wall-clock time in the widget's 12-hour display format.
pub fn format_12h(time: NaiveTime) -> String {
    time.format("%-I:%M %p").to_string()
}

/// Parse the human-entered 12-hour slot label back into a wall-clock
/// time. Returns `None` for anything unparseable -- callers abort with an
/// explicit error rather than defaulting silently.
pub fn parse_12h(label: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(label.trim(), "%I:%M %p").ok()
}
