// ── Canonical domain model ──
//
// Strongly-typed domain entities the rest of the core operates on.
// Wire payloads (`bookly_api::types`) are normalized into these via
// `crate::convert`; legacy cache payloads via the store's normalizers.

pub mod activity;
pub mod booking;
pub mod contact;
pub mod slot;
pub mod venue;
pub mod voucher;

pub use activity::{Activity, ScheduleRule, SchedulePatch, TicketType};
pub use booking::{Booking, BookingStatus, TicketLine};
pub use contact::CustomerContact;
pub use slot::{format_12h, parse_12h, Session, Slot};
pub use venue::Venue;
pub use voucher::{DiscountKind, GiftCard, PromoCode};
