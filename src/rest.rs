//! REST ticker queries
//!
//! Point queries against the OKX market endpoint, used to refresh the store
//! on demand when the stream has not delivered a symbol yet.

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{RelayError, Result};
use crate::parser::{RestResponse, Tick};
use crate::store::{PriceStore, Symbol};

/// OKX REST client for ticker snapshots
#[derive(Debug, Clone)]
pub struct RestClient {
    client: reqwest::Client,
    endpoint: String,
}

impl RestClient {
    pub fn new(endpoint: &str, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    pub fn ticker_url(&self, symbol: &Symbol) -> String {
        format!("{}/market/ticker?instId={}", self.endpoint, symbol)
    }

    /// Fetch the ticker for one symbol
    pub async fn fetch_ticker(&self, symbol: &Symbol) -> Result<Option<Tick>> {
        let url = self.ticker_url(symbol);
        debug!(symbol = %symbol, url = %url, "Fetching ticker snapshot");

        let response = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<RestResponse>()
            .await?;

        if !response.is_ok() {
            return Err(RelayError::RestApiError(format!(
                "{} returned code {}: {}",
                symbol, response.code, response.msg
            )));
        }

        Ok(response.ticks().into_iter().find(|tick| tick.symbol == *symbol))
    }

    /// Refresh every symbol of the store; returns how many were updated.
    ///
    /// A symbol whose query fails keeps its previous value.
    pub async fn refresh(&self, store: &PriceStore) -> usize {
        let mut updated = 0;

        for symbol in store.symbols() {
            match self.fetch_ticker(&symbol).await {
                Ok(Some(tick)) => match store.set(&symbol, tick.point) {
                    Ok(()) => updated += 1,
                    Err(e) => warn!(symbol = %symbol, error = %e, "Failed to store ticker"),
                },
                Ok(None) => warn!(symbol = %symbol, "Ticker reply carried no usable price"),
                Err(e) => warn!(symbol = %symbol, error = %e, "Ticker query failed"),
            }
        }

        info!(updated, total = store.len(), "REST refresh finished");
        updated
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticker_url() {
        let client = RestClient::new("https://www.okx.com/api/v5/", Duration::from_secs(5)).unwrap();
        assert_eq!(
            client.ticker_url(&Symbol::from("BTC-USDT")),
            "https://www.okx.com/api/v5/market/ticker?instId=BTC-USDT"
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_leaves_store_untouched() {
        // Nothing listens on port 9 of the loopback interface
        let client = RestClient::new("http://127.0.0.1:9/api/v5", Duration::from_millis(500)).unwrap();
        let store = PriceStore::new(["BTC-USDT", "ETH-USDT"]);

        assert_eq!(client.refresh(&store).await, 0);
        assert_eq!(store.known_count(), 0);
    }

    mod canned {
        use super::*;
        use axum::extract::Query;
        use axum::routing::get;
        use axum::{Json, Router};
        use rust_decimal_macros::dec;
        use serde_json::{json, Value};
        use std::collections::HashMap;

        async fn ticker(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
            let reply = match params.get("instId").map(String::as_str) {
                Some("BTC-USDT") => json!({
                    "code": "0",
                    "msg": "",
                    "data": [{
                        "instId": "BTC-USDT",
                        "last": "65000.5",
                        "open24h": "64000",
                        "vol24h": "10",
                        "ts": "1700000000000"
                    }]
                }),
                Some("ETH-USDT") => json!({
                    "code": "51001",
                    "msg": "Instrument ID does not exist",
                    "data": []
                }),
                _ => json!({"code": "0", "msg": "", "data": []}),
            };
            Json(reply)
        }

        /// OKX stand-in serving fixed ticker replies
        async fn serve() -> RestClient {
            let router = Router::new().route("/api/v5/market/ticker", get(ticker));
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
            RestClient::new(&format!("http://{addr}/api/v5"), Duration::from_secs(5)).unwrap()
        }

        #[tokio::test]
        async fn test_fetch_ticker_parses_reply() {
            let client = serve().await;

            let tick = client
                .fetch_ticker(&Symbol::from("BTC-USDT"))
                .await
                .unwrap()
                .expect("tick");
            assert_eq!(tick.point.last, Some(dec!(65000.5)));
            assert_eq!(tick.point.volume_24h, Some(dec!(10)));
        }

        #[tokio::test]
        async fn test_error_code_is_rest_api_error() {
            let client = serve().await;

            let err = client.fetch_ticker(&Symbol::from("ETH-USDT")).await.unwrap_err();
            assert!(matches!(err, RelayError::RestApiError(msg) if msg.contains("51001")));
        }

        #[tokio::test]
        async fn test_refresh_updates_only_good_replies() {
            let client = serve().await;
            let store = PriceStore::new(["BTC-USDT", "ETH-USDT", "SOL-USDT"]);
            let eth = Symbol::from("ETH-USDT");
            let previous = crate::store::PricePoint {
                last: Some(dec!(3000)),
                ..crate::store::PricePoint::unknown()
            };
            store.set(&eth, previous).unwrap();

            assert_eq!(client.refresh(&store).await, 1);

            let btc = store.get(&Symbol::from("BTC-USDT")).unwrap();
            assert_eq!(btc.last, Some(dec!(65000.5)));
            assert_eq!(store.get(&eth).unwrap().last, Some(dec!(3000)));
            assert!(!store.get(&Symbol::from("SOL-USDT")).unwrap().is_known());
        }
    }
}
