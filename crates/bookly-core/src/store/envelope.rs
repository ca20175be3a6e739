// ── Persistence envelope ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The unit of persistence and of cross-instance diffing: a versioned
/// wrapper around an entity collection, carrying update provenance.
///
/// Every write bumps `version` and `updated_at`. Readers must never
/// assume version numbers are monotonic across legacy sources -- only
/// within the canonical key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub version: u64,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
    pub organization_id: String,
    pub items: Vec<T>,
}

impl<T> Envelope<T> {
    /// A fresh, never-written envelope.
    pub fn new(organization_id: impl Into<String>, items: Vec<T>) -> Self {
        Self {
            version: 0,
            updated_at: Utc::now(),
            updated_by: None,
            organization_id: organization_id.into(),
            items,
        }
    }

    /// Record a write: bump the version and stamp provenance.
    pub fn touch(&mut self, updated_by: Option<&str>) {
        self.version += 1;
        self.updated_at = Utc::now();
        self.updated_by = updated_by.map(str::to_owned);
    }
}
