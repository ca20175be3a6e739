// ── Availability engine ──
//
// Given (activity, date), produce ranked bookable slots. Two sources,
// strict precedence: backend sessions when the live feed knows any for
// that date, procedural generation from the recurrence rule otherwise.
// The engine only reads -- it never mutates activity or booking state,
// and the `Slot` values it returns are ephemeral, never persisted.
//
// All schedule math is wall-clock in the activity's configured offset
// (venue offset fallback), so results are stable regardless of the
// host's local timezone.

use chrono::{DateTime, Datelike, Duration, NaiveDateTime, Timelike, Utc};

use crate::model::{format_12h, Activity, Booking, Session, Slot};

// ── Clock seam ───────────────────────────────────────────────────────

/// Abstracts "now" for deterministic tests.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Production clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed clock for tests and replay.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

// ── Engine ───────────────────────────────────────────────────────────

pub struct AvailabilityEngine {
    clock: std::sync::Arc<dyn Clock>,
    venue_offset_minutes: i32,
}

impl AvailabilityEngine {
    pub fn new(clock: std::sync::Arc<dyn Clock>, venue_offset_minutes: i32) -> Self {
        Self {
            clock,
            venue_offset_minutes,
        }
    }

    /// Compute slots for (activity, date).
    ///
    /// `sessions` is whatever the live-session source returned for the
    /// range (empty on fetch failure -- errors fall back to procedural
    /// generation, they never surface). `bookings` is the full local
    /// booking cache; filtering happens here.
    pub fn compute_slots(
        &self,
        activity: &Activity,
        date: chrono::NaiveDate,
        bookings: &[Booking],
        sessions: &[Session],
    ) -> Vec<Slot> {
        let offset = activity.effective_offset_minutes(self.venue_offset_minutes);

        let mut live: Vec<Slot> = sessions
            .iter()
            .filter(|session| session.activity_id == activity.id)
            .filter_map(|session| session_slot(session, date, offset))
            .collect();

        if !live.is_empty() {
            live.sort_by_key(|slot| slot.start);
            return live;
        }

        let now_local = self.clock.now_utc().naive_utc() + Duration::minutes(i64::from(offset));
        generate_slots(activity, date, bookings, now_local)
    }
}

// ── Live path ────────────────────────────────────────────────────────

/// Map one backend session to a slot, if it lands on `date` in the
/// activity's wall clock.
fn session_slot(session: &Session, date: chrono::NaiveDate, offset_minutes: i32) -> Option<Slot> {
    let local = session.start_time.naive_utc() + Duration::minutes(i64::from(offset_minutes));
    if local.date() != date {
        return None;
    }
    let spots = u32::try_from(session.capacity_remaining.max(0)).unwrap_or(0);
    Some(Slot {
        time: format_12h(local.time()),
        start: local.time(),
        available: spots > 0,
        spots,
        session_id: Some(session.id.clone()),
    })
}

// ── Procedural path ──────────────────────────────────────────────────

/// Generate slots from the recurrence rule. Pure: `now_local` is the
/// wall-clock "now" in the activity's timezone.
pub fn generate_slots(
    activity: &Activity,
    date: chrono::NaiveDate,
    bookings: &[Booking],
    now_local: NaiveDateTime,
) -> Vec<Slot> {
    // Blocked always wins, even over the explicit allow-list.
    if activity.blocked_dates.contains(&date) {
        return Vec::new();
    }

    // Admission: allow-listed dates win; otherwise the weekday must be
    // an operating day.
    let weekday = u8::try_from(date.weekday().num_days_from_monday()).unwrap_or(0);
    let admissible =
        activity.custom_available_dates.contains(&date) || activity.schedule.operates_on(weekday);
    if !admissible {
        return Vec::new();
    }

    let rule = &activity.schedule;
    if rule.slot_interval_minutes == 0 {
        tracing::debug!(activity = %activity.id, "slot interval of zero, no slots generated");
        return Vec::new();
    }

    let open = minutes_of_day(rule.start_time);
    let close = minutes_of_day(rule.end_time);
    let duration = i64::from(activity.duration_minutes);
    let step = i64::from(rule.slot_interval_minutes);

    let cutoff = if date == now_local.date() {
        Some(minutes_of_day(now_local.time()) + i64::from(rule.advance_booking_minutes))
    } else {
        None
    };

    let mut slots = Vec::new();
    let mut candidate = open;
    while candidate <= close {
        // A slot must finish by closing time.
        if candidate + duration > close {
            break;
        }
        // Same-day slots inside the advance-booking window are gone.
        if cutoff.is_some_and(|cutoff| candidate < cutoff) {
            candidate += step;
            continue;
        }

        let Some(start) = time_from_minutes(candidate) else {
            break;
        };
        let label = format_12h(start);
        let consumed = consumed_participants(bookings, &activity.id, date, &label);
        let spots = activity.capacity.saturating_sub(consumed);

        slots.push(Slot {
            time: label,
            start,
            available: spots > 0,
            spots,
            session_id: None,
        });

        candidate += step;
    }

    slots
}

/// Total participants of confirmed bookings at the exact
/// (activity, date, time).
pub fn consumed_participants(
    bookings: &[Booking],
    activity_id: &str,
    date: chrono::NaiveDate,
    time: &str,
) -> u32 {
    bookings
        .iter()
        .filter(|b| {
            b.consumes_capacity() && b.activity_id == activity_id && b.date == date && b.time == time
        })
        .map(Booking::party_size)
        .sum()
}

fn minutes_of_day(time: chrono::NaiveTime) -> i64 {
    i64::from(time.num_seconds_from_midnight()) / 60
}

fn time_from_minutes(minutes: i64) -> Option<chrono::NaiveTime> {
    let h = u32::try_from(minutes / 60).ok()?;
    let m = u32::try_from(minutes % 60).ok()?;
    chrono::NaiveTime::from_hms_opt(h, m, 0)
}
