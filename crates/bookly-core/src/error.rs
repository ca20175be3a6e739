// ── Core error types ──
//
// User-facing errors from bookly-core. These are NOT API-specific --
// consumers never see HTTP status codes or JSON parse failures directly.
// The `From<bookly_api::Error>` impl translates transport-layer errors
// into domain-appropriate variants.
//
// Nothing here is process-fatal: every variant resolves to a retractable
// discount, a re-navigable wizard step, or a retry affordance.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Local validation ─────────────────────────────────────────────
    /// A contact or input field failed local validation. Recoverable
    /// inline; blocks no other wizard step.
    #[error("Validation failed for {field}: {message}")]
    Validation { field: String, message: String },

    /// A second checkout submission arrived while one was in flight.
    #[error("A checkout submission is already in progress")]
    AlreadyProcessing,

    // ── Discounts ────────────────────────────────────────────────────
    /// The backend rejected a previously-applied promo or gift code at
    /// submission time. The discount has already been retracted from
    /// local state; the flow resumes at cart/checkout.
    #[error("Discount '{code}' was rejected: {reason}")]
    DiscountInvalid { code: String, reason: String },

    // ── Availability ─────────────────────────────────────────────────
    /// Slot capacity was exhausted between selection and submission.
    /// The user is routed back to time-slot selection.
    #[error("Selected slot is no longer available: {message}")]
    AvailabilityConflict { message: String },

    // ── Persistence ──────────────────────────────────────────────────
    /// A local store write failed. Logged by the store; mutations still
    /// return their best-effort in-memory result, so this surfaces only
    /// from operations with nothing to return.
    #[error("Local persistence failed: {message}")]
    Persistence { message: String },

    // ── Network ──────────────────────────────────────────────────────
    /// A remote fetch failed and no cached data could stand in for it.
    #[error("Network error: {message}")]
    Network { message: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("{entity_kind} not found: {identifier}")]
    NotFound {
        entity_kind: String,
        identifier: String,
    },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<bookly_api::Error> for CoreError {
    fn from(err: bookly_api::Error) -> Self {
        if err.api_error_code() == Some(bookly_api::types::CODE_CAPACITY_EXHAUSTED) {
            let message = err.to_string();
            return CoreError::AvailabilityConflict { message };
        }

        match err {
            bookly_api::Error::Api {
                message,
                code,
                status,
            } => {
                if status == Some(404) {
                    CoreError::NotFound {
                        entity_kind: "resource".into(),
                        identifier: code.unwrap_or_default(),
                    }
                } else {
                    CoreError::Network { message }
                }
            }
            bookly_api::Error::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
            other => CoreError::Network {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_exhausted_maps_to_availability_conflict() {
        let api_err = bookly_api::Error::Api {
            message: "no remaining capacity".into(),
            code: Some(bookly_api::types::CODE_CAPACITY_EXHAUSTED.into()),
            status: Some(409),
        };
        let core: CoreError = api_err.into();
        assert!(matches!(core, CoreError::AvailabilityConflict { .. }));
    }

    #[test]
    fn transport_failure_maps_to_network() {
        let api_err = bookly_api::Error::Timeout { timeout_secs: 30 };
        let core: CoreError = api_err.into();
        assert!(matches!(core, CoreError::Network { .. }));
    }
}
