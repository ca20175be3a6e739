// ── Checkout / pricing engine ──
//
// Deterministic pricing pipeline plus the submission gate that hands a
// priced cart off to the payment collaborator. The pipeline's stage
// order is load-bearing and must not be permuted:
//
//   1. subtotal
//   2. per-ticket-type promos (percentage of each type's own subtotal)
//   3. checkout-level promo (percentage of the running subtotal, or a
//      fixed amount clamped to it)
//   4. fee on (subtotal − discounts)
//   5. gift-card redemption, applied last, never increasing the total
//   6. total = max(0, subtotal − discounts + fee − redemption)

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info, warn};

use bookly_api::types::{CheckoutContact, CheckoutRequest};
use bookly_api::BackendClient;

use crate::availability::Clock;
use crate::error::CoreError;
use crate::model::{
    parse_12h, Activity, Booking, BookingStatus, CustomerContact, DiscountKind, PromoCode, Slot,
    TicketLine,
};
use crate::store::EntityStore;

pub type Cents = i64;

/// Apply a fractional rate to an amount, rounding half away from zero
/// to whole cents.
pub fn apply_rate(amount: Cents, rate: f64) -> Cents {
    ((amount as f64) * rate).round() as Cents
}

// ── Pricing pipeline ─────────────────────────────────────────────────

/// Every intermediate figure of the pipeline, for display and audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PriceBreakdown {
    pub subtotal_cents: Cents,
    pub per_type_discount_cents: Cents,
    pub checkout_discount_cents: Cents,
    pub fee_cents: Cents,
    pub gift_card_redemption_cents: Cents,
    pub total_cents: Cents,
}

impl PriceBreakdown {
    pub fn discounts_cents(&self) -> Cents {
        self.per_type_discount_cents + self.checkout_discount_cents
    }
}

/// Run the six-stage pipeline.
///
/// `type_promos` are catalog promos scoped to ticket types; at most one
/// applies per type (first match wins) and only percentage kinds count.
/// `checkout_promo` is the user-entered checkout-level discount.
/// `gift_card_balance_cents` is the validated live balance, if a card
/// is applied.
pub fn price_cart(
    lines: &[TicketLine],
    type_promos: &[PromoCode],
    checkout_promo: Option<&PromoCode>,
    fee_rate: f64,
    gift_card_balance_cents: Option<Cents>,
) -> PriceBreakdown {
    // 1. Subtotal.
    let subtotal: Cents = lines
        .iter()
        .map(|line| line.unit_price_cents * Cents::from(line.quantity))
        .sum();

    // 2. Per-ticket-type promos.
    let mut per_type_discount: Cents = 0;
    let mut promoted_types: HashSet<&str> = HashSet::new();
    for promo in type_promos {
        let Some(ref type_id) = promo.ticket_type_id else {
            continue;
        };
        if !promoted_types.insert(type_id.as_str()) {
            // At most one active promo per ticket type.
            continue;
        }
        let DiscountKind::Percent(percent) = promo.kind else {
            continue;
        };
        let type_subtotal: Cents = lines
            .iter()
            .filter(|line| line.ticket_type_id == *type_id)
            .map(|line| line.unit_price_cents * Cents::from(line.quantity))
            .sum();
        per_type_discount += apply_rate(type_subtotal, percent / 100.0);
    }

    // 3. Checkout-level promo against the running subtotal.
    let running = subtotal - per_type_discount;
    let checkout_discount = match checkout_promo.map(|p| p.kind) {
        Some(DiscountKind::Percent(percent)) => apply_rate(running, percent / 100.0),
        Some(DiscountKind::Fixed(amount)) => amount.min(running).max(0),
        None => 0,
    };

    // 4. Fee on the discounted amount.
    let discounted = subtotal - per_type_discount - checkout_discount;
    let fee = apply_rate(discounted, fee_rate);

    // 5. Gift card, last: can only reduce, never increase.
    let payable = discounted + fee;
    let redemption = gift_card_balance_cents
        .map(|balance| balance.max(0).min(payable.max(0)))
        .unwrap_or(0);

    // 6. Clamped total.
    let total = (payable - redemption).max(0);

    PriceBreakdown {
        subtotal_cents: subtotal,
        per_type_discount_cents: per_type_discount,
        checkout_discount_cents: checkout_discount,
        fee_cents: fee,
        gift_card_redemption_cents: redemption,
        total_cents: total,
    }
}

// ── Time normalization ───────────────────────────────────────────────

/// Parse the human-facing 12-hour slot label into the backend's 24-hour
/// start/end pair; the end is derived by adding the activity duration.
/// Unparseable input aborts with an explicit error -- never a silent
/// default.
pub fn normalize_slot_times(
    slot_time: &str,
    duration_minutes: u32,
) -> Result<(String, String), CoreError> {
    let start = parse_12h(slot_time).ok_or_else(|| {
        CoreError::validation(
            "time",
            format!("could not interpret slot time '{slot_time}'"),
        )
    })?;
    let end = start + Duration::minutes(i64::from(duration_minutes));
    Ok((
        start.format("%H:%M").to_string(),
        end.format("%H:%M").to_string(),
    ))
}

// ── Submission gate ──────────────────────────────────────────────────

/// A checkout submission: the cart plus everything the hand-off needs.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub venue_id: String,
    pub activity: Activity,
    pub date: chrono::NaiveDate,
    pub slot: Slot,
    pub tickets: Vec<TicketLine>,
    pub contact: CustomerContact,
    /// Checkout-level promo code the user applied, if any.
    pub promo_code: Option<String>,
    /// Gift card code the user applied, if any.
    pub gift_card_code: Option<String>,
    pub fee_rate: f64,
    /// Opaque payment price reference forwarded to the gateway.
    pub price_ref: String,
}

/// Successful hand-off: where to send the user, what they will pay.
#[derive(Debug, Clone)]
pub struct CheckoutOutcome {
    pub redirect_url: String,
    pub breakdown: PriceBreakdown,
    /// Local booking recorded as pending payment.
    pub booking_id: String,
}

/// Drives validation, remote discount re-validation, and the payment
/// hand-off. One engine per widget instance; the `is_processing` guard
/// rejects duplicate concurrent submissions.
pub struct CheckoutEngine {
    api: Arc<BackendClient>,
    store: Arc<EntityStore>,
    clock: Arc<dyn Clock>,
    is_processing: AtomicBool,
}

impl CheckoutEngine {
    pub fn new(api: Arc<BackendClient>, store: Arc<EntityStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            api,
            store,
            clock,
            is_processing: AtomicBool::new(false),
        }
    }

    /// Whether a submission is currently in flight.
    pub fn is_processing(&self) -> bool {
        self.is_processing.load(Ordering::SeqCst)
    }

    /// Price the cart exactly as submission would, without touching the
    /// network. Uses locally cached discount state.
    pub fn quote(&self, request: &SubmitRequest) -> PriceBreakdown {
        let now = self.clock.now_utc();
        let type_promos = self.usable_type_promos(now);
        let checkout_promo = request
            .promo_code
            .as_deref()
            .and_then(|code| self.store.promo_by_code(code))
            .filter(|promo| promo.usable_at(now) && promo.ticket_type_id.is_none());
        let gift_balance = request
            .gift_card_code
            .as_deref()
            .and_then(|code| self.store.voucher_by_code(code))
            .filter(|card| card.usable_at(now))
            .map(|card| card.balance_cents);

        price_cart(
            &request.tickets,
            &type_promos,
            checkout_promo.as_ref(),
            request.fee_rate,
            gift_balance,
        )
    }

    /// The submission gate.
    ///
    /// Local validation, remote re-validation of every applied discount
    /// (revoking rejected ones from the store), time normalization, and
    /// the reservation hand-off. Slots that carried a `session_id` are
    /// forwarded so the backend can atomically decrement that session;
    /// template-mode slots race other bookers and may come back as an
    /// availability conflict.
    pub async fn submit(&self, request: SubmitRequest) -> Result<CheckoutOutcome, CoreError> {
        let _guard = ProcessingGuard::acquire(&self.is_processing)?;

        // Local field validation first; cheapest failure.
        request.contact.validate()?;
        let contact = request.contact.sanitized();

        if request.tickets.iter().map(|t| t.quantity).sum::<u32>() == 0 {
            return Err(CoreError::validation("tickets", "the cart is empty"));
        }

        let now = self.clock.now_utc();
        let type_promos = self.usable_type_promos(now);

        let subtotal: Cents = request
            .tickets
            .iter()
            .map(|line| line.unit_price_cents * Cents::from(line.quantity))
            .sum();

        // Remote re-validation: every locally applied discount must
        // survive, or the submission aborts and the discount is revoked.
        let checkout_promo = match request.promo_code.as_deref() {
            Some(code) => Some(self.revalidate_promo(code, subtotal).await?),
            None => None,
        };
        let gift_balance = match request.gift_card_code.as_deref() {
            Some(code) => Some(self.revalidate_gift_card(code).await?),
            None => None,
        };

        let breakdown = price_cart(
            &request.tickets,
            &type_promos,
            checkout_promo.as_ref(),
            request.fee_rate,
            gift_balance,
        );

        let (start_time, end_time) =
            normalize_slot_times(&request.slot.time, request.activity.duration_minutes)?;

        let party_size: u32 = request.tickets.iter().map(|t| t.quantity).sum();
        let api_request = CheckoutRequest {
            venue_id: request.venue_id.clone(),
            activity_id: request.activity.id.clone(),
            session_id: request.slot.session_id.clone(),
            date: request.date.to_string(),
            start_time,
            end_time,
            party_size,
            contact: CheckoutContact {
                name: contact.name.clone(),
                email: contact.email.clone(),
                phone: contact.phone.clone(),
            },
            total_cents: breakdown.total_cents,
            price_ref: request.price_ref.clone(),
        };

        debug!(
            activity = %request.activity.id,
            session = api_request.session_id.as_deref().unwrap_or("<template>"),
            total_cents = breakdown.total_cents,
            "submitting checkout"
        );

        let response = self.api.create_checkout(&api_request).await.map_err(CoreError::from)?;

        // Record the hand-off locally so other widget instances see the
        // pending reservation immediately.
        let booking = Booking {
            id: uuid::Uuid::new_v4().to_string(),
            activity_id: request.activity.id.clone(),
            date: request.date,
            time: request.slot.time.clone(),
            tickets: request.tickets.clone(),
            promo_code: request.promo_code.clone(),
            session_id: request.slot.session_id.clone(),
            status: BookingStatus::Pending,
            created_at: now,
        };
        let booking = self.store.save_booking(booking);

        info!(booking = %booking.id, "checkout handed off to payment");

        Ok(CheckoutOutcome {
            redirect_url: response.redirect_url,
            breakdown,
            booking_id: booking.id,
        })
    }

    /// Catalog promos scoped to ticket types and locally usable now.
    fn usable_type_promos(&self, now: chrono::DateTime<chrono::Utc>) -> Vec<PromoCode> {
        self.store
            .promo_codes()
            .into_iter()
            .filter(|promo| promo.ticket_type_id.is_some() && promo.usable_at(now))
            .collect()
    }

    /// Re-validate the checkout-level promo remotely. A rejection
    /// deactivates the local copy (notifying subscribers through the
    /// bus) and aborts with `DiscountInvalid`.
    async fn revalidate_promo(&self, code: &str, amount_cents: Cents) -> Result<PromoCode, CoreError> {
        let validation = self
            .api
            .validate_promo(code, amount_cents)
            .await
            .map_err(CoreError::from)?;

        if !validation.valid {
            let reason = validation
                .message
                .unwrap_or_else(|| "promo code is no longer valid".into());
            self.revoke_promo(code);
            return Err(CoreError::DiscountInvalid {
                code: code.to_owned(),
                reason,
            });
        }

        let kind = if let Some(percent) = validation.percent_off {
            DiscountKind::Percent(percent)
        } else if let Some(amount) = validation.amount_off_cents {
            DiscountKind::Fixed(amount)
        } else {
            self.revoke_promo(code);
            return Err(CoreError::DiscountInvalid {
                code: code.to_owned(),
                reason: "backend accepted the code but returned no discount".into(),
            });
        };

        // The backend's answer is authoritative; mirror it over any
        // locally cached copy.
        Ok(PromoCode {
            id: self
                .store
                .promo_by_code(code)
                .map_or_else(|| format!("promo:{code}"), |p| p.id),
            code: code.to_owned(),
            kind,
            ticket_type_id: validation.ticket_type_id,
            starts_at: None,
            expires_at: None,
            max_uses: None,
            used_count: 0,
            active: true,
        })
    }

    /// Re-validate the gift card remotely, returning its live balance.
    async fn revalidate_gift_card(&self, code: &str) -> Result<Cents, CoreError> {
        let validation = self
            .api
            .validate_gift_card(code)
            .await
            .map_err(CoreError::from)?;

        if !validation.valid {
            let reason = validation
                .message
                .unwrap_or_else(|| "gift card is no longer valid".into());
            if let Some(card) = self.store.voucher_by_code(code) {
                self.store.delete_voucher(&card.id);
                warn!(code, "revoked invalid gift card from local state");
            }
            return Err(CoreError::DiscountInvalid {
                code: code.to_owned(),
                reason,
            });
        }

        // Mirror the authoritative balance locally.
        if let Some(card) = self.store.voucher_by_code(code) {
            self.store.update_voucher(&card.id, |c| {
                c.balance_cents = validation.balance_cents;
            });
        }

        Ok(validation.balance_cents)
    }

    fn revoke_promo(&self, code: &str) {
        if let Some(promo) = self.store.promo_by_code(code) {
            self.store.update_promo_code(&promo.id, |p| p.active = false);
            warn!(code, "revoked rejected promo code from local state");
        }
    }
}

/// RAII guard for the duplicate-submission latch.
struct ProcessingGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ProcessingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, CoreError> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| CoreError::AlreadyProcessing)?;
        Ok(Self { flag })
    }
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn line(type_id: &str, quantity: u32, unit: Cents) -> TicketLine {
        TicketLine {
            ticket_type_id: type_id.into(),
            quantity,
            unit_price_cents: unit,
        }
    }

    fn percent_promo(code: &str, percent: f64, type_id: Option<&str>) -> PromoCode {
        PromoCode {
            id: format!("promo:{code}"),
            code: code.into(),
            kind: DiscountKind::Percent(percent),
            ticket_type_id: type_id.map(Into::into),
            starts_at: None,
            expires_at: None,
            max_uses: None,
            used_count: 0,
            active: true,
        }
    }

    fn fixed_promo(code: &str, cents: Cents) -> PromoCode {
        PromoCode {
            kind: DiscountKind::Fixed(cents),
            ..percent_promo(code, 0.0, None)
        }
    }

    #[test]
    fn pipeline_scenario() {
        // subtotal $100: $60 of adult tickets, $40 of child tickets.
        // Per-type 15% on the $60 slice → $9. Fixed checkout promo $10
        // → cumulative $19. Fee 6% × $81 = $4.86. Gift card balance $50
        // redeems min(50, 85.86) = $50. Total $35.86.
        let lines = [line("tt_adult", 2, 3000), line("tt_child", 2, 2000)];
        let type_promos = [percent_promo("ADULT15", 15.0, Some("tt_adult"))];
        let checkout_promo = fixed_promo("TENOFF", 1000);

        let breakdown = price_cart(
            &lines,
            &type_promos,
            Some(&checkout_promo),
            0.06,
            Some(5000),
        );

        assert_eq!(breakdown.subtotal_cents, 10_000);
        assert_eq!(breakdown.per_type_discount_cents, 900);
        assert_eq!(breakdown.checkout_discount_cents, 1000);
        assert_eq!(breakdown.fee_cents, 486);
        assert_eq!(breakdown.gift_card_redemption_cents, 5000);
        assert_eq!(breakdown.total_cents, 3586);
    }

    #[test]
    fn totals_never_go_below_zero() {
        let lines = [line("tt_adult", 1, 1000)];
        let breakdown = price_cart(&lines, &[], Some(&fixed_promo("BIG", 99_000)), 0.0, Some(99_000));
        assert_eq!(breakdown.checkout_discount_cents, 1000, "fixed promo clamps");
        assert_eq!(breakdown.total_cents, 0);
    }

    #[test]
    fn adding_discounts_is_monotonic_non_increasing() {
        let lines = [line("tt_adult", 2, 3000), line("tt_child", 2, 2000)];

        let bare = price_cart(&lines, &[], None, 0.06, None);
        let with_type = price_cart(
            &lines,
            &[percent_promo("ADULT15", 15.0, Some("tt_adult"))],
            None,
            0.06,
            None,
        );
        let with_both = price_cart(
            &lines,
            &[percent_promo("ADULT15", 15.0, Some("tt_adult"))],
            Some(&fixed_promo("TENOFF", 1000)),
            0.06,
            None,
        );
        let with_gift = price_cart(
            &lines,
            &[percent_promo("ADULT15", 15.0, Some("tt_adult"))],
            Some(&fixed_promo("TENOFF", 1000)),
            0.06,
            Some(2000),
        );

        assert!(with_type.total_cents <= bare.total_cents);
        assert!(with_both.total_cents <= with_type.total_cents);
        assert!(with_gift.total_cents <= with_both.total_cents);
    }

    #[test]
    fn one_promo_per_ticket_type() {
        let lines = [line("tt_adult", 1, 10_000)];
        let promos = [
            percent_promo("FIRST10", 10.0, Some("tt_adult")),
            percent_promo("SECOND50", 50.0, Some("tt_adult")),
        ];
        let breakdown = price_cart(&lines, &promos, None, 0.0, None);
        // Only the first promo applies.
        assert_eq!(breakdown.per_type_discount_cents, 1000);
    }

    #[test]
    fn non_percentage_type_promos_are_ignored() {
        let lines = [line("tt_adult", 1, 10_000)];
        let mut promo = percent_promo("FIXED", 0.0, Some("tt_adult"));
        promo.kind = DiscountKind::Fixed(500);
        let breakdown = price_cart(&lines, &[promo], None, 0.0, None);
        assert_eq!(breakdown.per_type_discount_cents, 0);
    }

    #[test]
    fn percent_checkout_promo_applies_to_running_subtotal() {
        let lines = [line("tt_adult", 1, 10_000)];
        let type_promos = [percent_promo("ADULT10", 10.0, Some("tt_adult"))];
        let checkout = percent_promo("EXTRA10", 10.0, None);
        let breakdown = price_cart(&lines, &type_promos, Some(&checkout), 0.0, None);
        // 10% of the running 9_000, not of the original 10_000.
        assert_eq!(breakdown.checkout_discount_cents, 900);
    }

    #[test]
    fn gift_card_covers_at_most_the_payable_amount() {
        let lines = [line("tt_adult", 1, 2000)];
        let breakdown = price_cart(&lines, &[], None, 0.0, Some(99_999));
        assert_eq!(breakdown.gift_card_redemption_cents, 2000);
        assert_eq!(breakdown.total_cents, 0);
    }

    #[test]
    fn rate_application_rounds_half_away_from_zero() {
        assert_eq!(apply_rate(1001, 0.065), 65); // 65.065 → 65
        assert_eq!(apply_rate(1050, 0.05), 53); // 52.5 → 53
        assert_eq!(apply_rate(0, 0.5), 0);
    }

    #[test]
    fn normalize_parses_and_derives_end_time() {
        let (start, end) = normalize_slot_times("10:00 AM", 60).unwrap();
        assert_eq!(start, "10:00");
        assert_eq!(end, "11:00");

        let (start, end) = normalize_slot_times("1:30 PM", 90).unwrap();
        assert_eq!(start, "13:30");
        assert_eq!(end, "15:00");
    }

    #[test]
    fn normalize_rejects_unparseable_time() {
        let err = normalize_slot_times("sometime soon", 60).unwrap_err();
        assert!(matches!(err, CoreError::Validation { ref field, .. } if field == "time"));
    }
}
