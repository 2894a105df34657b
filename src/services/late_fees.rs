/// Step schedule for late fees on a single month of rent.
///
/// A flat fee applies once the payment is `initial_after_days` late, then a
/// daily fee accrues for each day past `daily_after_days` (at most
/// `max_daily_days` of them). The total never exceeds `cap_ratio` of rent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LateFeePolicy {
    pub initial_fee: f64,
    pub initial_after_days: i64,
    pub daily_fee: f64,
    pub daily_after_days: i64,
    pub max_daily_days: i64,
    pub cap_ratio: f64,
}

impl Default for LateFeePolicy {
    fn default() -> Self {
        Self {
            initial_fee: 50.0,
            initial_after_days: 3,
            daily_fee: 5.0,
            daily_after_days: 4,
            max_daily_days: 10,
            cap_ratio: 0.12,
        }
    }
}

impl LateFeePolicy {
    pub fn fee(&self, days_late: i64, rent: f64) -> f64 {
        if days_late <= 0 || !rent.is_finite() || rent <= 0.0 {
            return 0.0;
        }

        let initial = if days_late >= self.initial_after_days {
            self.initial_fee
        } else {
            0.0
        };
        let daily_days = (days_late - self.daily_after_days)
            .max(0)
            .min(self.max_daily_days.max(0));
        let uncapped = initial + daily_days as f64 * self.daily_fee;

        let cap = rent * self.cap_ratio.max(0.0);
        round_cents(uncapped.min(cap).max(0.0))
    }

    /// True on the days the fee steps up (a new tier, a daily increment, or
    /// the cap being reached).
    pub fn fee_increased(&self, days_late: i64, rent: f64) -> bool {
        self.fee(days_late, rent) > self.fee(days_late - 1, rent)
    }
}

pub(crate) fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}
