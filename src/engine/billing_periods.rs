//! Billing period generation: calendar-aware stepping with day-of-month
//! clamping, and the "earlier period wins" boundary lookup.

use time::{Date, Month, OffsetDateTime};

use crate::ids::{BillingPeriodId, IdSequence};
use crate::model::{BillingFrequency, BillingPeriod, Subscription};

/// Advances `instant`'s date by one step of `frequency`, preserving
/// day-of-month and clamping to the last day of the target month when the
/// source day does not exist there (e.g. Jan 31 + 1 month = Feb 28/29).
fn step(instant: OffsetDateTime, frequency: BillingFrequency) -> OffsetDateTime {
    let months = match frequency {
        BillingFrequency::Monthly => 1,
        BillingFrequency::Quarterly => 3,
        BillingFrequency::Yearly => 12,
    };
    add_calendar_months(instant, months)
}

fn add_calendar_months(instant: OffsetDateTime, months_to_add: i32) -> OffsetDateTime {
    let date = instant.date();
    let month_index0 = date.month() as i32 - 1;
    let total = date.year() * 12 + month_index0 + months_to_add;
    let new_year = total.div_euclid(12);
    let new_month0 = total.rem_euclid(12);
    let new_month = Month::try_from((new_month0 + 1) as u8).expect("0..=11 maps to a valid month");
    let max_day = days_in_month(new_year, new_month);
    let day = date.day().min(max_day);
    let new_date =
        Date::from_calendar_date(new_year, new_month, day).expect("clamped day is always valid");
    instant.replace_date(new_date)
}

fn days_in_month(year: i32, month: Month) -> u8 {
    time::util::days_in_year_month(year, month)
}

/// Generates the contiguous, non-overlapping sequence of billing periods
/// for `subscription` under `frequency`.
///
/// When the subscription has a fixed `end`, generation stops there and the
/// final period is clipped to it. When the subscription is open-ended,
/// generation stops after the first period whose `start` is strictly after
/// `now` — one period of lookahead beyond the current instant — rather than
/// materializing periods out to an arbitrary future horizon.
pub fn generate_periods(
    subscription: &Subscription,
    frequency: BillingFrequency,
    now: OffsetDateTime,
    sequence: &IdSequence,
) -> Vec<BillingPeriod> {
    let mut periods = Vec::new();
    let mut start = subscription.start;

    loop {
        let mut end = step(start, frequency);
        let mut is_final = false;
        if let Some(sub_end) = subscription.end {
            if end >= sub_end {
                end = sub_end;
                is_final = true;
            }
        }

        periods.push(BillingPeriod {
            id: BillingPeriodId::from(sequence.next()),
            subscription_id: subscription.id,
            start,
            end,
            invoice_id: None,
        });

        if is_final {
            break;
        }
        if subscription.end.is_none() && start > now {
            break;
        }
        start = end;
    }

    periods
}

/// Finds the billing period covering `at` among `periods`, under the
/// earlier-period-wins boundary rule. `periods` must be sorted by `start`
/// ascending; the first period whose `[start, end]` contains `at` wins even
/// though the next period's `start` also equals this period's `end`.
pub fn find_period_for(periods: &[BillingPeriod], at: OffsetDateTime) -> Option<&BillingPeriod> {
    periods.iter().find(|period| period.contains(at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SubscriptionId;
    use time::macros::datetime;

    fn subscription(start: OffsetDateTime, end: Option<OffsetDateTime>) -> Subscription {
        Subscription {
            id: SubscriptionId(1),
            customer_id: crate::ids::CustomerId(1),
            plan_id: crate::ids::PlanId(1),
            start,
            end,
            active: true,
        }
    }

    #[test]
    fn clamps_day_of_month_on_short_months() {
        let start = datetime!(2024-01-31 00:00:00 UTC);
        let stepped = step(start, BillingFrequency::Monthly);
        assert_eq!(stepped.date(), datetime!(2024-02-29 00:00:00 UTC).date());
    }

    #[test]
    fn final_period_clips_to_subscription_end() {
        let start = datetime!(2024-01-01 00:00:00 UTC);
        let end = datetime!(2024-02-15 00:00:00 UTC);
        let sub = subscription(start, Some(end));
        let periods = generate_periods(&sub, BillingFrequency::Monthly, start, &IdSequence::new());
        assert_eq!(periods.last().unwrap().end, end);
        assert!(periods.windows(2).all(|w| w[0].end == w[1].start));
    }

    #[test]
    fn boundary_instant_belongs_to_earlier_period() {
        let start = datetime!(2024-01-01 00:00:00 UTC);
        let end = datetime!(2024-03-01 00:00:00 UTC);
        let sub = subscription(start, Some(end));
        let periods = generate_periods(&sub, BillingFrequency::Monthly, start, &IdSequence::new());
        let boundary = periods[0].end;
        let found = find_period_for(&periods, boundary).unwrap();
        assert_eq!(found.start, periods[0].start);
    }

    #[test]
    fn open_ended_subscription_generates_one_period_of_lookahead() {
        let start = datetime!(2024-01-01 00:00:00 UTC);
        let sub = subscription(start, None);
        let now = datetime!(2024-03-15 00:00:00 UTC);
        let periods = generate_periods(&sub, BillingFrequency::Monthly, now, &IdSequence::new());
        assert!(periods.last().unwrap().start > now);
        assert!(periods.iter().rev().nth(1).unwrap().start <= now);
    }
}
