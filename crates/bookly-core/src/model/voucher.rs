// ── Discount instruments ──
//
// Promo codes and gift cards as held in the local catalog. Applied
// discounts are provisional client state until the backend re-validates
// them at submission time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a promo code takes off.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    /// Percentage off, e.g. `Percent(15.0)` for 15%.
    Percent(f64),
    /// Fixed amount off in cents, clamped to the running subtotal.
    Fixed(i64),
}

/// A promo code: per-ticket-type when `ticket_type_id` is set, otherwise
/// checkout-level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoCode {
    pub id: String,
    pub code: String,
    pub kind: DiscountKind,
    /// Scopes the discount to a single ticket type's own subtotal.
    #[serde(default)]
    pub ticket_type_id: Option<String>,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// `None` means unlimited.
    #[serde(default)]
    pub max_uses: Option<u32>,
    #[serde(default)]
    pub used_count: u32,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl PromoCode {
    /// Local usability check: active, inside the validity window, uses
    /// remaining. The backend's validation at submission stays
    /// authoritative.
    pub fn usable_at(&self, now: DateTime<Utc>) -> bool {
        if !self.active {
            return false;
        }
        if self.starts_at.is_some_and(|start| now < start) {
            return false;
        }
        if self.expires_at.is_some_and(|end| now > end) {
            return false;
        }
        if self.max_uses.is_some_and(|max| self.used_count >= max) {
            return false;
        }
        true
    }
}

/// A gift card with a redeemable balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GiftCard {
    pub id: String,
    pub code: String,
    pub balance_cents: i64,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl GiftCard {
    pub fn usable_at(&self, now: DateTime<Utc>) -> bool {
        self.balance_cents > 0 && !self.expires_at.is_some_and(|end| now > end)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn promo() -> PromoCode {
        PromoCode {
            id: "pr_1".into(),
            code: "SAVE15".into(),
            kind: DiscountKind::Percent(15.0),
            ticket_type_id: None,
            starts_at: None,
            expires_at: None,
            max_uses: None,
            used_count: 0,
            active: true,
        }
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn promo_usable_without_constraints() {
        assert!(promo().usable_at(at(2025, 11, 20)));
    }

    #[test]
    fn promo_respects_validity_window() {
        let mut p = promo();
        p.starts_at = Some(at(2025, 12, 1));
        assert!(!p.usable_at(at(2025, 11, 20)));

        p.starts_at = None;
        p.expires_at = Some(at(2025, 11, 1));
        assert!(!p.usable_at(at(2025, 11, 20)));
    }

    #[test]
    fn promo_respects_usage_counter() {
        let mut p = promo();
        p.max_uses = Some(10);
        p.used_count = 10;
        assert!(!p.usable_at(at(2025, 11, 20)));
    }

    #[test]
    fn inactive_promo_is_unusable() {
        let mut p = promo();
        p.active = false;
        assert!(!p.usable_at(at(2025, 11, 20)));
    }

    #[test]
    fn drained_gift_card_is_unusable() {
        let card = GiftCard {
            id: "gc_1".into(),
            code: "GC-X".into(),
            balance_cents: 0,
            expires_at: None,
        };
        assert!(!card.usable_at(at(2025, 11, 20)));
    }
}
