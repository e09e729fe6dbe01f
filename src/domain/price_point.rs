//! Daily price record in canonical form.

use chrono::NaiveDate;

/// One trading day for one instrument. Unique per `(code, date)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricePoint {
    pub code: String,
    pub date: NaiveDate,
    pub open: i64,
    pub high: i64,
    pub low: i64,
    pub close: i64,
    pub volume: i64,
    pub amount: i64,
}

impl PricePoint {
    /// Exact equality of open, high, low and close. Volume and amount are ignored.
    pub fn same_prices(&self, other: &PricePoint) -> bool {
        self.open == other.open
            && self.high == other.high
            && self.low == other.low
            && self.close == other.close
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_point() -> PricePoint {
        PricePoint {
            code: "005930".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            open: 70_000,
            high: 71_500,
            low: 69_800,
            close: 71_000,
            volume: 12_345_678,
            amount: 876_543,
        }
    }

    #[test]
    fn same_prices_ignores_volume_and_amount() {
        let a = sample_point();
        let b = PricePoint {
            volume: 1,
            amount: 2,
            ..sample_point()
        };
        assert!(a.same_prices(&b));
    }

    #[test]
    fn same_prices_detects_close_change() {
        let a = sample_point();
        let b = PricePoint {
            close: 70_500,
            ..sample_point()
        };
        assert!(!a.same_prices(&b));
    }

    #[test]
    fn same_prices_detects_low_change() {
        let a = sample_point();
        let b = PricePoint {
            low: 69_000,
            ..sample_point()
        };
        assert!(!a.same_prices(&b));
    }
}
