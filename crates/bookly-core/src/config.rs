// ── Runtime widget configuration ──
//
// These types describe *which* venue the widget serves and how it
// behaves at runtime. They never touch disk -- the embedding shell (or
// bookly-config) constructs a `WidgetConfig` and hands it in.

use std::time::Duration;

/// Configuration for a single widget instance.
#[derive(Debug, Clone)]
pub struct WidgetConfig {
    /// Venue the widget is embedded for.
    pub venue_id: String,
    /// Organization scope for storage keys and envelopes.
    pub organization_id: String,
    /// Provenance tag stamped into envelopes written by this instance
    /// (e.g. a widget-instance id). Optional.
    pub updated_by: Option<String>,
    /// Request timeout for backend calls.
    pub timeout: Duration,
    /// How often to refresh the catalog (seconds). 0 = never.
    pub refresh_interval_secs: u64,
    /// Enable the live change feed.
    pub live_enabled: bool,
    /// Storage-observer polling cadence (seconds). 0 = no observer.
    pub polling_interval_secs: u64,
    /// Fallback platform fee rate until the venue fetch provides the
    /// authoritative one.
    pub fee_rate: f64,
    /// Fallback wall-clock offset until the venue fetch provides the
    /// authoritative one.
    pub utc_offset_minutes: i32,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            venue_id: String::new(),
            organization_id: String::new(),
            updated_by: None,
            timeout: Duration::from_secs(30),
            refresh_interval_secs: 300,
            live_enabled: true,
            polling_interval_secs: 2,
            fee_rate: 0.0,
            utc_offset_minutes: 0,
        }
    }
}
