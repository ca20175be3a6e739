//! Reactive data layer between `bookly-api` and the widget UI shells.
//!
//! This crate owns the business logic, domain model, and reactive data
//! infrastructure for the Bookly booking-widget workspace:
//!
//! - **[`BookingWidget`]** — Composition-root facade managing the full
//!   lifecycle: [`connect()`](BookingWidget::connect) fetches the venue and
//!   catalog, then spawns background tasks for periodic refresh, the live
//!   session feed, and cross-instance storage observation.
//!
//! - **[`EntityStore`]** — Versioned, normalized local cache of domain
//!   entities persisted as [`Envelope`]s through a swappable
//!   [`StorageBackend`], with an ordered legacy-source migration path.
//!   Mutators emit `<kind>-updated` events on the [`EventBus`]
//!   synchronously after each write.
//!
//! - **[`AvailabilityEngine`]** — Given (activity, date), produces ranked
//!   bookable [`Slot`]s: backend sessions take precedence, procedural
//!   generation from the recurrence rule is the fallback.
//!
//! - **[`BookingFlow`]** — The wizard as an explicit finite-state machine:
//!   a tagged union of step payloads and a pure, total transition
//!   function that rejects invalid transitions.
//!
//! - **[`CheckoutEngine`]** — Deterministic, order-sensitive discount
//!   stacking plus the submission gate: local validation, remote
//!   re-validation of applied discounts, time normalization, and the
//!   payment hand-off.

pub mod availability;
pub mod bus;
pub mod checkout;
pub mod config;
pub mod convert;
pub mod error;
pub mod flow;
pub mod model;
pub mod observer;
pub mod store;
pub mod widget;

// ── Primary re-exports ──────────────────────────────────────────────
pub use availability::{AvailabilityEngine, Clock, FixedClock, SystemClock};
pub use bus::{ChangeOrigin, EventBus, StoreEvent};
pub use checkout::{CheckoutEngine, CheckoutOutcome, PriceBreakdown, SubmitRequest};
pub use config::WidgetConfig;
pub use error::CoreError;
pub use flow::{BookingFlow, FlowEvent};
pub use observer::{ChangeObserver, PollingObserver, StorageChange};
pub use store::{
    EntityKind, EntityStore, Envelope, FileBackend, MemoryBackend, StorageBackend, StoreScope,
};
pub use widget::{BookingWidget, ConnectionState};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    Activity,
    Booking,
    BookingStatus,
    CustomerContact,
    DiscountKind,
    GiftCard,
    PromoCode,
    ScheduleRule,
    SchedulePatch,
    Session,
    Slot,
    TicketLine,
    TicketType,
    Venue,
};
