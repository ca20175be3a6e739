// ── Venue ──

use serde::{Deserialize, Serialize};

use super::activity::SchedulePatch;

/// The venue the widget is embedded for.
///
/// Not a store entity: fetched at connect time and held by the widget.
/// Carries the organization-level schedule defaults (middle tier of the
/// schedule merge) and the wall-clock offset activities fall back to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Venue {
    pub id: String,
    pub name: String,
    pub organization_id: String,
    /// IANA-style label, informational only.
    #[serde(default)]
    pub timezone: Option<String>,
    pub utc_offset_minutes: i32,
    pub currency: String,
    /// Platform fee rate, e.g. `0.06` for 6%.
    pub fee_rate: f64,
    #[serde(default)]
    pub schedule_defaults: Option<SchedulePatch>,
}
