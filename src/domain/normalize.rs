//! Parsing of upstream numeric and date fields into canonical values.
//!
//! Every function here is total: malformed input maps to zero and is reported
//! through [`Normalized::malformed`] instead of an error.

use crate::domain::price_point::PricePoint;
use crate::domain::quote::RawRecord;
use chrono::NaiveDate;

/// A canonical integer plus whether the raw input had to be defaulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Normalized {
    pub value: i64,
    pub malformed: bool,
}

impl Normalized {
    fn clean(value: i64) -> Self {
        Self {
            value,
            malformed: false,
        }
    }

    fn defaulted() -> Self {
        Self {
            value: 0,
            malformed: true,
        }
    }
}

/// Strip grouping separators and parse a possibly signed integer.
pub fn parse_grouped(raw: &str) -> Normalized {
    let digits: String = raw.trim().chars().filter(|c| *c != ',').collect();
    match digits.parse::<i64>() {
        Ok(value) => Normalized::clean(value),
        Err(_) => Normalized::defaulted(),
    }
}

/// Open/high/low/close. Upstream prefixes a direction sign that carries no
/// price information, so the magnitude is kept.
pub fn normalize_price(raw: &str) -> Normalized {
    let parsed = parse_grouped(raw);
    Normalized {
        value: parsed.value.saturating_abs(),
        ..parsed
    }
}

/// Volume and amount, taken as-is.
pub fn normalize_quantity(raw: &str) -> Normalized {
    parse_grouped(raw)
}

/// `YYYYMMDD`, tolerating `-` or `/` separators.
pub fn normalize_date(raw: &str) -> Option<NaiveDate> {
    let compact: String = raw.trim().chars().filter(|c| *c != '-' && *c != '/').collect();
    NaiveDate::parse_from_str(&compact, "%Y%m%d").ok()
}

#[derive(Debug, Clone)]
pub struct NormalizedRecord {
    pub point: PricePoint,
    /// Names of the fields that were defaulted to zero.
    pub malformed: Vec<&'static str>,
}

/// Normalize one raw record. `None` when the date cannot be parsed, since the
/// record would have no key.
pub fn normalize_record(code: &str, raw: &RawRecord) -> Option<NormalizedRecord> {
    let date = normalize_date(&raw.date)?;
    let mut malformed = Vec::new();

    let mut field = |name: &'static str, n: Normalized| {
        if n.malformed {
            malformed.push(name);
        }
        n.value
    };

    let open = field("open", normalize_price(&raw.open));
    let high = field("high", normalize_price(&raw.high));
    let low = field("low", normalize_price(&raw.low));
    let close = field("close", normalize_price(&raw.close));
    let volume = field("volume", normalize_quantity(&raw.volume));
    let amount = field("amount", normalize_quantity(&raw.amount));

    Some(NormalizedRecord {
        point: PricePoint {
            code: code.to_string(),
            date,
            open,
            high,
            low,
            close,
            volume,
            amount,
        },
        malformed,
    })
}
