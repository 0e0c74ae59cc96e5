use crate::domain::{DateRange, Error};
use crate::money::Money;

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Number of billable days: partial days round up, and the minimum is one.
pub fn rental_days(period: &DateRange) -> i64 {
    let millis = (period.end() - period.start()).num_milliseconds();
    let days = millis / MILLIS_PER_DAY + i64::from(millis % MILLIS_PER_DAY != 0);
    days.max(1)
}

pub fn amount(period: &DateRange, daily_rate: Money) -> Result<Money, Error> {
    if !daily_rate.is_positive() {
        return Err(Error::InvalidDailyRate);
    }
    daily_rate
        .checked_mul(rental_days(period))
        .ok_or(Error::AmountOverflow)
}
