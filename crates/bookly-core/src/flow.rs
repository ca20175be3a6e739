// ── Booking flow state machine ──
//
// The wizard as one explicit finite-state machine: a tagged union of
// step-specific payloads and a pure, total transition function. An
// invalid transition returns the state unchanged -- no transition ever
// applies a partial update.
//
// Cascade-clear rules: changing activity clears date + time + tickets;
// changing date clears time (tickets survive); changing time keeps the
// ticket configuration.

use serde::{Deserialize, Serialize};

use crate::model::{CustomerContact, Slot, TicketLine};

/// Wizard state. Each variant carries exactly the selections accumulated
/// so far, so every reachable state is self-describing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BookingFlow {
    SelectingActivity,
    SelectingDate {
        activity_id: String,
    },
    SelectingTime {
        activity_id: String,
        date: chrono::NaiveDate,
        /// Ticket configuration carried across date/time changes.
        tickets: Vec<TicketLine>,
    },
    ConfiguringTickets {
        activity_id: String,
        date: chrono::NaiveDate,
        slot: Slot,
        tickets: Vec<TicketLine>,
    },
    Cart {
        activity_id: String,
        date: chrono::NaiveDate,
        slot: Slot,
        tickets: Vec<TicketLine>,
    },
    Checkout {
        activity_id: String,
        date: chrono::NaiveDate,
        slot: Slot,
        tickets: Vec<TicketLine>,
        contact: CustomerContact,
    },
    PaymentRedirect {
        activity_id: String,
        date: chrono::NaiveDate,
        slot: Slot,
        tickets: Vec<TicketLine>,
        contact: CustomerContact,
        redirect_url: String,
    },
    Success {
        booking_id: String,
    },
    Failed {
        reason: String,
    },
}

/// Everything that can happen to the wizard.
#[derive(Debug, Clone)]
pub enum FlowEvent {
    /// User picked (or switched) the activity.
    ActivityChosen { activity_id: String },
    /// User picked a date; `open_slots` is the number of available slots
    /// the availability engine found for it.
    DateChosen {
        date: chrono::NaiveDate,
        open_slots: usize,
    },
    /// User picked a time slot.
    TimeChosen { slot: Slot },
    /// User committed a ticket configuration.
    TicketsConfirmed { tickets: Vec<TicketLine> },
    /// User entered contact details and asked to check out.
    CheckoutStarted { contact: CustomerContact },
    /// Remote re-validation of all applied discounts succeeded and the
    /// backend returned the payment redirect.
    DiscountsVerified { redirect_url: String },
    PaymentSucceeded { booking_id: String },
    PaymentFailed { reason: String },
}

impl Default for BookingFlow {
    fn default() -> Self {
        Self::SelectingActivity
    }
}

impl BookingFlow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pure, total transition function.
    ///
    /// Guards: entering `SelectingTime` requires a date with at least one
    /// available slot; entering `Cart` requires at least one configured
    /// ticket; entering `Checkout` requires syntactically valid contact
    /// fields; `PaymentRedirect` is only reachable from `Checkout` (the
    /// checkout engine fires `DiscountsVerified` after remote
    /// re-validation). Anything else returns the state unchanged.
    #[must_use]
    pub fn apply(&self, event: FlowEvent) -> Self {
        match event {
            // Switching activity restarts downstream selection wholesale.
            FlowEvent::ActivityChosen { activity_id } => {
                Self::SelectingDate { activity_id }
            }

            FlowEvent::DateChosen { date, open_slots } => {
                if open_slots == 0 {
                    return self.clone();
                }
                match self.selection() {
                    Some(sel) => Self::SelectingTime {
                        activity_id: sel.activity_id.to_owned(),
                        date,
                        tickets: sel.tickets.to_vec(),
                    },
                    None => self.clone(),
                }
            }

            FlowEvent::TimeChosen { slot } => {
                if !slot.available {
                    return self.clone();
                }
                match self {
                    Self::SelectingTime {
                        activity_id,
                        date,
                        tickets,
                    }
                    | Self::ConfiguringTickets {
                        activity_id,
                        date,
                        tickets,
                        ..
                    }
                    | Self::Cart {
                        activity_id,
                        date,
                        tickets,
                        ..
                    }
                    | Self::Checkout {
                        activity_id,
                        date,
                        tickets,
                        ..
                    } => Self::ConfiguringTickets {
                        activity_id: activity_id.clone(),
                        date: *date,
                        slot,
                        tickets: tickets.clone(),
                    },
                    _ => self.clone(),
                }
            }

            FlowEvent::TicketsConfirmed { tickets } => {
                if tickets.iter().map(|t| t.quantity).sum::<u32>() == 0 {
                    return self.clone();
                }
                match self {
                    Self::ConfiguringTickets {
                        activity_id,
                        date,
                        slot,
                        ..
                    }
                    | Self::Cart {
                        activity_id,
                        date,
                        slot,
                        ..
                    } => Self::Cart {
                        activity_id: activity_id.clone(),
                        date: *date,
                        slot: slot.clone(),
                        tickets,
                    },
                    _ => self.clone(),
                }
            }

            FlowEvent::CheckoutStarted { contact } => match self {
                Self::Cart {
                    activity_id,
                    date,
                    slot,
                    tickets,
                } if contact.validate().is_ok() => Self::Checkout {
                    activity_id: activity_id.clone(),
                    date: *date,
                    slot: slot.clone(),
                    tickets: tickets.clone(),
                    contact,
                },
                _ => self.clone(),
            },

            FlowEvent::DiscountsVerified { redirect_url } => match self {
                Self::Checkout {
                    activity_id,
                    date,
                    slot,
                    tickets,
                    contact,
                } => Self::PaymentRedirect {
                    activity_id: activity_id.clone(),
                    date: *date,
                    slot: slot.clone(),
                    tickets: tickets.clone(),
                    contact: contact.clone(),
                    redirect_url,
                },
                _ => self.clone(),
            },

            FlowEvent::PaymentSucceeded { booking_id } => match self {
                Self::PaymentRedirect { .. } => Self::Success { booking_id },
                _ => self.clone(),
            },

            FlowEvent::PaymentFailed { reason } => match self {
                Self::PaymentRedirect { .. } | Self::Checkout { .. } => Self::Failed { reason },
                _ => self.clone(),
            },
        }
    }

    /// The accumulated selection, if the flow has one.
    fn selection(&self) -> Option<SelectionView<'_>> {
        match self {
            Self::SelectingActivity | Self::Success { .. } | Self::Failed { .. } => None,
            Self::SelectingDate { activity_id } => Some(SelectionView {
                activity_id,
                tickets: &[],
            }),
            Self::SelectingTime {
                activity_id,
                tickets,
                ..
            }
            | Self::ConfiguringTickets {
                activity_id,
                tickets,
                ..
            }
            | Self::Cart {
                activity_id,
                tickets,
                ..
            }
            | Self::Checkout {
                activity_id,
                tickets,
                ..
            }
            | Self::PaymentRedirect {
                activity_id,
                tickets,
                ..
            } => Some(SelectionView {
                activity_id,
                tickets,
            }),
        }
    }

    /// The chosen date, when one exists.
    pub fn date(&self) -> Option<chrono::NaiveDate> {
        match self {
            Self::SelectingTime { date, .. }
            | Self::ConfiguringTickets { date, .. }
            | Self::Cart { date, .. }
            | Self::Checkout { date, .. }
            | Self::PaymentRedirect { date, .. } => Some(*date),
            _ => None,
        }
    }

    /// The chosen slot, when one exists.
    pub fn slot(&self) -> Option<&Slot> {
        match self {
            Self::ConfiguringTickets { slot, .. }
            | Self::Cart { slot, .. }
            | Self::Checkout { slot, .. }
            | Self::PaymentRedirect { slot, .. } => Some(slot),
            _ => None,
        }
    }
}

struct SelectionView<'a> {
    activity_id: &'a str,
    tickets: &'a [TicketLine],
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    fn slot(time: &str, hour: u32, available: bool) -> Slot {
        Slot {
            time: time.into(),
            start: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            available,
            spots: u32::from(available),
            session_id: None,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, 20).unwrap()
    }

    fn tickets() -> Vec<TicketLine> {
        vec![TicketLine {
            ticket_type_id: "tt_adult".into(),
            quantity: 2,
            unit_price_cents: 3500,
        }]
    }

    fn contact() -> CustomerContact {
        CustomerContact {
            name: "Jamie Rivera".into(),
            email: "jamie@example.com".into(),
            phone: "5558675309".into(),
        }
    }

    /// Walk the happy path up to the cart.
    fn cart_state() -> BookingFlow {
        BookingFlow::new()
            .apply(FlowEvent::ActivityChosen {
                activity_id: "act_1".into(),
            })
            .apply(FlowEvent::DateChosen {
                date: date(),
                open_slots: 3,
            })
            .apply(FlowEvent::TimeChosen {
                slot: slot("10:00 AM", 10, true),
            })
            .apply(FlowEvent::TicketsConfirmed { tickets: tickets() })
    }

    #[test]
    fn happy_path_reaches_payment_redirect() {
        let flow = cart_state()
            .apply(FlowEvent::CheckoutStarted { contact: contact() })
            .apply(FlowEvent::DiscountsVerified {
                redirect_url: "https://pay.example/cs_1".into(),
            });

        assert!(matches!(flow, BookingFlow::PaymentRedirect { ref redirect_url, .. }
            if redirect_url == "https://pay.example/cs_1"));

        let done = flow.apply(FlowEvent::PaymentSucceeded {
            booking_id: "bkg_1".into(),
        });
        assert!(matches!(done, BookingFlow::Success { .. }));
    }

    #[test]
    fn switching_activity_resets_date_and_time() {
        // Scenario: date + time were chosen, then the activity changes.
        let flow = cart_state().apply(FlowEvent::ActivityChosen {
            activity_id: "act_2".into(),
        });

        assert_eq!(
            flow,
            BookingFlow::SelectingDate {
                activity_id: "act_2".into()
            }
        );
        assert!(flow.date().is_none());
        assert!(flow.slot().is_none());
    }

    #[test]
    fn refuses_selecting_time_without_open_slots() {
        let flow = BookingFlow::new()
            .apply(FlowEvent::ActivityChosen {
                activity_id: "act_2".into(),
            })
            .apply(FlowEvent::DateChosen {
                date: date(),
                open_slots: 0,
            });

        assert_eq!(
            flow,
            BookingFlow::SelectingDate {
                activity_id: "act_2".into()
            }
        );
    }

    #[test]
    fn changing_date_clears_time_but_keeps_tickets() {
        let flow = cart_state().apply(FlowEvent::DateChosen {
            date: NaiveDate::from_ymd_opt(2025, 11, 21).unwrap(),
            open_slots: 2,
        });

        match flow {
            BookingFlow::SelectingTime { ref tickets, .. } => {
                assert_eq!(tickets, &self::tickets());
            }
            other => panic!("expected SelectingTime, got {other:?}"),
        }
    }

    #[test]
    fn changing_time_keeps_ticket_configuration() {
        let flow = cart_state().apply(FlowEvent::TimeChosen {
            slot: slot("1:00 PM", 13, true),
        });

        match flow {
            BookingFlow::ConfiguringTickets {
                ref slot,
                ref tickets,
                ..
            } => {
                assert_eq!(slot.time, "1:00 PM");
                assert_eq!(tickets, &self::tickets());
            }
            other => panic!("expected ConfiguringTickets, got {other:?}"),
        }
    }

    #[test]
    fn unavailable_slot_is_rejected() {
        let before = BookingFlow::new()
            .apply(FlowEvent::ActivityChosen {
                activity_id: "act_1".into(),
            })
            .apply(FlowEvent::DateChosen {
                date: date(),
                open_slots: 1,
            });
        let after = before.apply(FlowEvent::TimeChosen {
            slot: slot("10:00 AM", 10, false),
        });
        assert_eq!(before, after);
    }

    #[test]
    fn empty_cart_cannot_proceed() {
        let configuring = cart_state().apply(FlowEvent::TimeChosen {
            slot: slot("1:00 PM", 13, true),
        });
        let after = configuring.apply(FlowEvent::TicketsConfirmed {
            tickets: Vec::new(),
        });
        assert_eq!(configuring, after);
    }

    #[test]
    fn invalid_contact_blocks_checkout() {
        let cart = cart_state();
        let after = cart.apply(FlowEvent::CheckoutStarted {
            contact: CustomerContact {
                name: "Jamie".into(),
                email: "nope".into(),
                phone: "123".into(),
            },
        });
        assert_eq!(cart, after);
    }

    #[test]
    fn payment_redirect_requires_checkout_state() {
        let cart = cart_state();
        let after = cart.apply(FlowEvent::DiscountsVerified {
            redirect_url: "https://pay.example/cs_1".into(),
        });
        assert_eq!(cart, after, "cart cannot jump straight to redirect");
    }

    #[test]
    fn out_of_order_events_leave_state_unchanged() {
        let fresh = BookingFlow::new();
        let after = fresh
            .apply(FlowEvent::TimeChosen {
                slot: slot("10:00 AM", 10, true),
            })
            .apply(FlowEvent::TicketsConfirmed { tickets: tickets() })
            .apply(FlowEvent::PaymentSucceeded {
                booking_id: "bkg_1".into(),
            });
        assert_eq!(fresh, after);
    }
}
