//! REST quote adapter for the brokerage market-data API.
//!
//! Both endpoints take a JSON POST body and page through the `cont-yn` /
//! `next-key` header pair. Every failure mode (transport, timeout, HTTP
//! status, `return_code`, undecodable body) surfaces as
//! `SyncError::UpstreamUnavailable` so the orchestrator can record it and
//! move on to the next instrument.

use crate::domain::error::SyncError;
use crate::domain::instrument::Instrument;
use crate::domain::quote::{InstrumentPage, QuotePage, RawRecord, SyncCursor};
use crate::ports::config_port::ConfigPort;
use crate::ports::quote_port::QuotePort;
use chrono::NaiveDate;
use reqwest::blocking::Client;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, trace};

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

const DAILY_PRICE_PATH: &str = "/api/dostk/mrkcond";
const DAILY_PRICE_API_ID: &str = "ka10086";
const INSTRUMENT_LIST_PATH: &str = "/api/dostk/stkinfo";
const INSTRUMENT_LIST_API_ID: &str = "ka10099";

#[derive(Debug, Serialize)]
struct DailyPriceRequest<'a> {
    stk_cd: &'a str,
    qry_dt: String,
    indc_tp: &'static str,
}

#[derive(Debug, Serialize)]
struct InstrumentListRequest<'a> {
    mrkt_tp: &'a str,
}

#[derive(Debug, Deserialize)]
struct DailyPriceResponse {
    #[serde(default)]
    return_code: Option<Value>,
    #[serde(default)]
    return_msg: Option<String>,
    #[serde(default)]
    daly_stkpc: Option<Vec<DailyPriceItem>>,
}

/// Field names vary between API revisions. Both spellings are kept and the
/// long name wins when it carries a value.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DailyPriceItem {
    #[serde(deserialize_with = "lenient_opt")]
    date: Option<String>,
    #[serde(deserialize_with = "lenient_opt")]
    open_pric: Option<String>,
    #[serde(deserialize_with = "lenient_opt")]
    open: Option<String>,
    #[serde(deserialize_with = "lenient_opt")]
    high_pric: Option<String>,
    #[serde(deserialize_with = "lenient_opt")]
    high: Option<String>,
    #[serde(deserialize_with = "lenient_opt")]
    low_pric: Option<String>,
    #[serde(deserialize_with = "lenient_opt")]
    low: Option<String>,
    #[serde(deserialize_with = "lenient_opt")]
    close_pric: Option<String>,
    #[serde(deserialize_with = "lenient_opt")]
    close: Option<String>,
    #[serde(deserialize_with = "lenient_opt")]
    trde_qty: Option<String>,
    #[serde(deserialize_with = "lenient_opt")]
    volume: Option<String>,
    #[serde(deserialize_with = "lenient_opt")]
    amt_mn: Option<String>,
    #[serde(deserialize_with = "lenient_opt")]
    amount: Option<String>,
}

impl From<DailyPriceItem> for RawRecord {
    fn from(item: DailyPriceItem) -> Self {
        RawRecord {
            date: item.date.unwrap_or_default(),
            open: item.open_pric.or(item.open).unwrap_or_default(),
            high: item.high_pric.or(item.high).unwrap_or_default(),
            low: item.low_pric.or(item.low).unwrap_or_default(),
            close: item.close_pric.or(item.close).unwrap_or_default(),
            volume: item.trde_qty.or(item.volume).unwrap_or_default(),
            amount: item.amt_mn.or(item.amount).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct InstrumentListResponse {
    #[serde(default)]
    return_code: Option<Value>,
    #[serde(default)]
    return_msg: Option<String>,
    #[serde(default)]
    list: Option<Vec<ListedInstrument>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ListedInstrument {
    code: String,
    name: String,
    #[serde(rename = "marketCode", deserialize_with = "lenient_string")]
    market_code: String,
}

/// Accept strings and bare numbers alike; anything else becomes empty.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_opt(deserializer)?.unwrap_or_default())
}

/// Like [`lenient_string`], but blank and non-scalar values are `None`.
fn lenient_opt<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) if !s.trim().is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn unavailable(code: &str, reason: impl Into<String>) -> SyncError {
    SyncError::UpstreamUnavailable {
        code: code.to_string(),
        reason: reason.into(),
    }
}

/// A missing `return_code` counts as success.
fn check_return_code(code: &str, rc: Option<&Value>, msg: Option<&str>) -> Result<(), SyncError> {
    let value = match rc {
        None | Some(Value::Null) => return Ok(()),
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(_) => None,
    };
    match value {
        Some(0) => Ok(()),
        Some(n) => Err(unavailable(
            code,
            format!("return_code {n}: {}", msg.unwrap_or("no message")),
        )),
        None => Err(unavailable(code, "unreadable return_code")),
    }
}

fn parse_daily_prices(code: &str, body: &str) -> Result<Vec<RawRecord>, SyncError> {
    let response: DailyPriceResponse = serde_json::from_str(body)
        .map_err(|e| unavailable(code, format!("undecodable daily price body: {e}")))?;
    check_return_code(
        code,
        response.return_code.as_ref(),
        response.return_msg.as_deref(),
    )?;

    Ok(response
        .daly_stkpc
        .unwrap_or_default()
        .into_iter()
        .map(RawRecord::from)
        .collect())
}

fn parse_instrument_list(market: &str, body: &str) -> Result<Vec<Instrument>, SyncError> {
    let response: InstrumentListResponse = serde_json::from_str(body)
        .map_err(|e| unavailable(market, format!("undecodable instrument list body: {e}")))?;
    check_return_code(
        market,
        response.return_code.as_ref(),
        response.return_msg.as_deref(),
    )?;

    Ok(response
        .list
        .unwrap_or_default()
        .into_iter()
        .filter(|item| !item.code.trim().is_empty())
        .map(|item| Instrument::new(item.code.trim(), item.name.trim(), item.market_code.trim()))
        .collect())
}

fn cursor_from_headers(cont_yn: Option<&str>, next_key: Option<&str>) -> SyncCursor {
    let has_more = cont_yn.map(str::trim) == Some("Y");
    SyncCursor::new(next_key.map(str::trim).unwrap_or_default(), has_more)
}

/// Upstream session: base URL, bearer token and a client with a fixed per-call timeout.
pub struct RestQuoteAdapter {
    client: Client,
    base_url: String,
    access_token: String,
}

impl RestQuoteAdapter {
    pub fn new(base_url: &str, access_token: &str, timeout: Duration) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| unavailable("client", format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            access_token: access_token.trim().to_string(),
        })
    }

    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, SyncError> {
        let base_url = config
            .get_string("upstream", "base_url")
            .ok_or_else(|| SyncError::ConfigMissing {
                section: "upstream".into(),
                key: "base_url".into(),
            })?;
        let access_token = config
            .get_string("upstream", "access_token")
            .ok_or_else(|| SyncError::ConfigMissing {
                section: "upstream".into(),
                key: "access_token".into(),
            })?;
        let timeout_secs = config.get_int("upstream", "timeout_secs", DEFAULT_TIMEOUT_SECS as i64);
        if timeout_secs <= 0 {
            return Err(SyncError::ConfigInvalid {
                section: "upstream".into(),
                key: "timeout_secs".into(),
                reason: "timeout_secs must be positive".into(),
            });
        }

        Self::new(
            &base_url,
            &access_token,
            Duration::from_secs(timeout_secs as u64),
        )
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POST one page request. Returns the continuation cursor and the raw body.
    fn post<B: Serialize>(
        &self,
        key: &str,
        path: &str,
        api_id: &str,
        cursor: &SyncCursor,
        body: &B,
    ) -> Result<(SyncCursor, String), SyncError> {
        let url = self.endpoint(path);
        trace!(url = %url, api_id, continuing = !cursor.is_exhausted(), "upstream request");

        let response = self
            .client
            .post(&url)
            .header("content-type", "application/json;charset=UTF-8")
            .header("authorization", format!("Bearer {}", self.access_token))
            .header("api-id", api_id)
            .header("cont-yn", if cursor.has_more { "Y" } else { "N" })
            .header("next-key", cursor.token.as_str())
            .json(body)
            .send()
            .map_err(|e| unavailable(key, format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(unavailable(key, format!("HTTP {status}")));
        }

        let headers = response.headers();
        let next = cursor_from_headers(
            headers.get("cont-yn").and_then(|v| v.to_str().ok()),
            headers.get("next-key").and_then(|v| v.to_str().ok()),
        );

        let text = response
            .text()
            .map_err(|e| unavailable(key, format!("cannot read body: {e}")))?;
        Ok((next, text))
    }
}

impl QuotePort for RestQuoteAdapter {
    fn fetch_page(
        &self,
        code: &str,
        cursor: &SyncCursor,
        as_of: NaiveDate,
    ) -> Result<QuotePage, SyncError> {
        let request = DailyPriceRequest {
            stk_cd: code,
            qry_dt: as_of.format("%Y%m%d").to_string(),
            indc_tp: "0",
        };
        let (next, body) = self.post(code, DAILY_PRICE_PATH, DAILY_PRICE_API_ID, cursor, &request)?;
        let records = parse_daily_prices(code, &body)?;
        debug!(code = %code, records = records.len(), has_more = next.has_more, "daily price page");

        Ok(QuotePage { records, next })
    }

    fn fetch_instrument_page(
        &self,
        market: &str,
        cursor: &SyncCursor,
    ) -> Result<InstrumentPage, SyncError> {
        let request = InstrumentListRequest { mrkt_tp: market };
        let (next, body) = self.post(
            market,
            INSTRUMENT_LIST_PATH,
            INSTRUMENT_LIST_API_ID,
            cursor,
            &request,
        )?;
        let instruments = parse_instrument_list(market, &body)?;

        Ok(InstrumentPage { instruments, next })
    }
}
