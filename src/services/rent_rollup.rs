//! Month-by-month reconstruction of a rent unit's ledger.
//!
//! Payments form a single pool that is applied to monthly obligations
//! oldest-first. A month counts as paid only once every earlier month has
//! been covered, so a recent payment never hides an older shortfall.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::services::{
    billing_calendar::{
        due_date_for_month, first_due_month_key, month_key, month_key_sequence, next_month_key,
        DueMonthDay, MonthKey,
    },
    late_fees::{round_cents, LateFeePolicy},
};

#[derive(Debug, Clone, PartialEq)]
pub struct RentTerms {
    pub rent: f64,
    pub due_pattern: DueMonthDay,
    /// Creation instant as wall-clock time in the reminder timezone.
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PaymentRecord {
    pub date: NaiveDate,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollupSnapshot {
    /// Every payment ever recorded for the unit.
    pub paid: f64,
    pub balance: f64,
    /// Earliest unpaid due date, or next month's due date when current.
    pub due_date: NaiveDate,
    pub late_fee: f64,
    pub total_due: f64,
    pub month_key: MonthKey,
}

impl RollupSnapshot {
    pub fn days_until_due(&self, today: NaiveDate) -> i64 {
        (self.due_date - today).num_days()
    }

    pub fn is_current(&self) -> bool {
        self.balance <= 0.0
    }
}

#[derive(Debug, Default)]
struct MonthPayments {
    total: f64,
    first_paid_on: Option<NaiveDate>,
}

fn group_by_month(payments: &[PaymentRecord]) -> BTreeMap<MonthKey, MonthPayments> {
    let mut months = BTreeMap::<MonthKey, MonthPayments>::new();
    for payment in payments.iter().filter(|payment| payment.amount.is_finite()) {
        let month = months.entry(month_key(payment.date)).or_default();
        month.total += payment.amount.max(0.0);
        month.first_paid_on = Some(
            month
                .first_paid_on
                .map_or(payment.date, |earliest| earliest.min(payment.date)),
        );
    }
    months
}

/// Compute the unit's ledger position as of `today`.
///
/// A month whose own payments reach rent is judged late from its earliest
/// payment date; any other month is judged against `today`. When every month
/// is covered the snapshot points at next month, or at the first due month
/// if billing has not started yet.
pub fn compute_rollup(
    terms: &RentTerms,
    payments: &[PaymentRecord],
    today: NaiveDate,
    policy: &LateFeePolicy,
) -> RollupSnapshot {
    let rent = if terms.rent.is_finite() {
        terms.rent.max(0.0)
    } else {
        0.0
    };
    let months = group_by_month(payments);

    let start = first_due_month_key(terms.created_at, terms.due_pattern);
    let end = month_key(today);

    let paid = round_cents(months.values().map(|month| month.total).sum());
    let mut pool = paid;
    let mut balance = 0.0;
    let mut late_fee = 0.0;
    let mut first_unpaid: Option<(NaiveDate, MonthKey)> = None;

    for key in month_key_sequence(start, end) {
        let due_date = due_date_for_month(key, terms.due_pattern);
        let reference = months
            .get(&key)
            .filter(|month| month.total >= rent)
            .and_then(|month| month.first_paid_on)
            .unwrap_or(today);
        let days_late = (reference - due_date).num_days().max(0);

        let fee = policy.fee(days_late, rent);
        let obligation = round_cents(rent + fee);

        if pool >= obligation {
            pool = round_cents(pool - obligation);
            continue;
        }

        balance += obligation - pool;
        late_fee += fee;
        pool = 0.0;
        if first_unpaid.is_none() {
            first_unpaid = Some((due_date, key));
        }
    }

    let (due_date, month_key) = first_unpaid.unwrap_or_else(|| {
        let next = next_month_key(end).max(start);
        (due_date_for_month(next, terms.due_pattern), next)
    });
    let balance = round_cents(balance);

    RollupSnapshot {
        paid,
        balance,
        due_date,
        late_fee: round_cents(late_fee),
        total_due: balance,
        month_key,
    }
}
