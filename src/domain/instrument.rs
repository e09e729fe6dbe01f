//! Instrument universe.
//!
//! Instruments are enumerated by the store; the market list used to populate
//! them is parsed from configuration or the command line.

use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instrument {
    pub code: String,
    pub name: String,
    pub market: String,
}

impl Instrument {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        market: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            market: market.into(),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum MarketListError {
    #[error("empty token in market list")]
    EmptyToken,

    #[error("duplicate market: {0}")]
    DuplicateMarket(String),
}

/// Parse a comma separated market list such as `"0,10"`.
pub fn parse_markets(input: &str) -> Result<Vec<String>, MarketListError> {
    let mut markets = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let market = token.trim();
        if market.is_empty() {
            return Err(MarketListError::EmptyToken);
        }
        if !seen.insert(market.to_string()) {
            return Err(MarketListError::DuplicateMarket(market.to_string()));
        }
        markets.push(market.to_string());
    }

    Ok(markets)
}
