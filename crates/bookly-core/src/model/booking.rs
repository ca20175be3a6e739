// ── Booking / cart records ──

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A committed ticket selection for one activity slot.
///
/// Created when a user commits their ticket configuration; consumed by the
/// availability engine when computing remaining capacity for future slot
/// queries; terminal on payment success/failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: String,
    pub activity_id: String,
    pub date: NaiveDate,
    /// 12-hour wall-clock label of the chosen slot, e.g. `"10:00 AM"`.
    pub time: String,
    pub tickets: Vec<TicketLine>,
    #[serde(default)]
    pub promo_code: Option<String>,
    /// Present only when the slot came from a live backend session.
    #[serde(default)]
    pub session_id: Option<String>,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    /// Total participant count across all ticket lines.
    pub fn party_size(&self) -> u32 {
        self.tickets.iter().map(|line| line.quantity).sum()
    }

    pub fn subtotal_cents(&self) -> i64 {
        self.tickets
            .iter()
            .map(|line| line.unit_price_cents * i64::from(line.quantity))
            .sum()
    }

    /// Whether this booking consumes slot capacity.
    pub fn consumes_capacity(&self) -> bool {
        matches!(self.status, BookingStatus::Confirmed)
    }
}

/// One ticket tier within a booking or cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketLine {
    pub ticket_type_id: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

/// Booking lifecycle. Only confirmed bookings consume capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// Handed off to payment; not yet paid.
    Pending,
    Confirmed,
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn booking(status: BookingStatus) -> Booking {
        Booking {
            id: "bkg_1".into(),
            activity_id: "act_1".into(),
            date: NaiveDate::from_ymd_opt(2025, 11, 20).expect("valid date"),
            time: "10:00 AM".into(),
            tickets: vec![
                TicketLine {
                    ticket_type_id: "tt_adult".into(),
                    quantity: 3,
                    unit_price_cents: 3500,
                },
                TicketLine {
                    ticket_type_id: "tt_child".into(),
                    quantity: 2,
                    unit_price_cents: 2000,
                },
            ],
            promo_code: None,
            session_id: None,
            status,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn party_size_sums_all_lines() {
        assert_eq!(booking(BookingStatus::Confirmed).party_size(), 5);
    }

    #[test]
    fn subtotal_multiplies_quantities() {
        assert_eq!(booking(BookingStatus::Confirmed).subtotal_cents(), 14500);
    }

    #[test]
    fn only_confirmed_bookings_consume_capacity() {
        assert!(booking(BookingStatus::Confirmed).consumes_capacity());
        assert!(!booking(BookingStatus::Pending).consumes_capacity());
        assert!(!booking(BookingStatus::Cancelled).consumes_capacity());
    }
}
