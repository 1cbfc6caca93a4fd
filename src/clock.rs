use chrono::{Local, NaiveDate, NaiveDateTime, Timelike};

use crate::model::Minute;

/// Source of "now" in the salon's local time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;

    fn today_and_minute(&self) -> (NaiveDate, Minute) {
        let now = self.now();
        (now.date(), now.hour() * 60 + now.minute())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Clock pinned to a fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_splits_date_and_minute() {
        let at = NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(9, 45, 30)
            .unwrap();
        let (date, minute) = FixedClock(at).today_and_minute();
        assert_eq!(date, NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        assert_eq!(minute, 9 * 60 + 45);
    }
}
