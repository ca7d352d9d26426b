//! Parser module for OKX public WebSocket and REST messages
//!
//! Handles deserialization of ticker pushes, event acknowledgements and the
//! application-level keep-alive reply.

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

use crate::store::{PricePoint, Symbol};

/// Raw ticker entry as sent by OKX (numeric fields normally arrive as strings)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTicker {
    /// Instrument ID
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub inst_id: Option<String>,

    /// Last traded price
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub last: Option<String>,

    /// Open price in the past 24 hours
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub open24h: Option<String>,

    /// 24h volume in base currency
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub vol24h: Option<String>,

    /// 24h change in percent, when the venue sends it directly
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub chg_pct24h: Option<String>,

    /// Data generation time (Unix ms)
    #[serde(default, deserialize_with = "deserialize_lenient")]
    pub ts: Option<String>,
}

/// Push envelope `{ "arg": {...}, "data": [...] }`
#[derive(Debug, Clone, Deserialize)]
pub struct PushMessage {
    pub arg: Option<ChannelArg>,
    pub data: Vec<serde_json::Value>,
}

/// Event frame (subscribe ack, error)
#[derive(Debug, Clone, Deserialize)]
pub struct EventMessage {
    pub event: String,
    pub arg: Option<ChannelArg>,
    pub code: Option<String>,
    pub msg: Option<String>,
}

/// REST envelope `{ "code": "0", "msg": "", "data": [...] }`
#[derive(Debug, Clone, Deserialize)]
pub struct RestResponse {
    pub code: String,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
}

/// Channel argument of a subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelArg {
    pub channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inst_id: Option<String>,
}

/// Subscribe request for a batch of instruments
#[derive(Debug, Clone, Serialize)]
pub struct SubscribeRequest {
    pub op: &'static str,
    pub args: Vec<ChannelArg>,
}

impl SubscribeRequest {
    /// Ticker subscription for every symbol, in one request
    pub fn tickers(symbols: &[Symbol]) -> Self {
        Self {
            op: "subscribe",
            args: symbols
                .iter()
                .map(|s| ChannelArg {
                    channel: "tickers".to_string(),
                    inst_id: Some(s.to_string()),
                })
                .collect(),
        }
    }

    pub fn to_json(&self) -> String {
        // Only string fields, serialization cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Normalized price update for one symbol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tick {
    pub symbol: Symbol,
    pub point: PricePoint,
}

/// Parsed WebSocket message
#[derive(Debug, Clone)]
pub enum ParsedMessage {
    /// Ticker updates; entries without a usable instrument or price are dropped
    Tickers {
        ticks: Vec<Tick>,
        skipped: usize,
    },
    Event(EventMessage),
    /// Reply to the text keep-alive `ping`
    Pong,
    Unknown(String),
}

impl ParsedMessage {
    /// Parse a raw WebSocket message
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let trimmed = raw.trim();
        if trimmed == "pong" {
            return Ok(ParsedMessage::Pong);
        }

        let value: serde_json::Value = serde_json::from_str(trimmed)?;

        if value.get("event").is_some() {
            let event: EventMessage = serde_json::from_value(value)?;
            return Ok(ParsedMessage::Event(event));
        }

        if value.get("data").is_some() {
            let push: PushMessage = serde_json::from_value(value)?;
            let is_tickers = push
                .arg
                .as_ref()
                .map(|arg| arg.channel == "tickers")
                .unwrap_or(true);
            if is_tickers {
                let (ticks, skipped) = parse_entries(&push.data);
                return Ok(ParsedMessage::Tickers { ticks, skipped });
            }
        }

        Ok(ParsedMessage::Unknown(trimmed.to_string()))
    }
}

impl RestResponse {
    /// Ticks carried by a successful REST reply
    pub fn ticks(&self) -> Vec<Tick> {
        parse_entries(&self.data).0
    }

    pub fn is_ok(&self) -> bool {
        self.code == "0"
    }
}

impl RawTicker {
    /// Normalize into a tick.
    ///
    /// Returns `None` without an instrument ID or a usable last price; any
    /// other field that does not parse becomes `None` on the point.
    pub fn into_tick(self) -> Option<Tick> {
        let symbol = Symbol::new(self.inst_id.filter(|s| !s.is_empty())?);
        let last = parse_decimal(self.last.as_deref())?;

        let change_pct_24h = parse_decimal(self.chg_pct24h.as_deref()).or_else(|| {
            parse_decimal(self.open24h.as_deref()).and_then(|open| change_pct(last, open))
        });

        Some(Tick {
            symbol,
            point: PricePoint {
                last: Some(last),
                change_pct_24h,
                volume_24h: parse_decimal(self.vol24h.as_deref()),
                updated_at: parse_timestamp(self.ts.as_deref()),
            },
        })
    }
}

/// Percent change from the 24h open; `None` when the open is zero or the
/// result does not fit in a `Decimal`
pub fn change_pct(last: Decimal, open: Decimal) -> Option<Decimal> {
    if open.is_zero() {
        return None;
    }
    last.checked_sub(open)?
        .checked_div(open)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
}

fn parse_entries(data: &[serde_json::Value]) -> (Vec<Tick>, usize) {
    let mut ticks = Vec::with_capacity(data.len());
    let mut skipped = 0;

    for entry in data {
        let tick = serde_json::from_value::<RawTicker>(entry.clone())
            .ok()
            .and_then(RawTicker::into_tick);
        match tick {
            Some(tick) => ticks.push(tick),
            None => skipped += 1,
        }
    }

    (ticks, skipped)
}

/// Accept a string or a bare number; anything else reads as absent
fn deserialize_lenient<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<serde_json::Value> = Deserialize::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn parse_decimal(raw: Option<&str>) -> Option<Decimal> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let millis: i64 = raw?.trim().parse().ok()?;
    Utc.timestamp_millis_opt(millis).single()
}
