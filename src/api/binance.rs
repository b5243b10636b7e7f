use async_trait::async_trait;
use chrono::Utc;
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use super::{ApiError, ApiResult, Exchange};
use crate::config::TraderConfig;
use crate::models::{AccountSnapshot, ExchangeLimits, OrderRequest, PriceSample};

// Endpoints relative to the `/api/` base
const EXCHANGE_INFO: &str = "v1/exchangeInfo";
const TICKER_PRICE: &str = "v3/ticker/price";
const TICKER_24HR: &str = "v1/ticker/24hr";
const ACCOUNT: &str = "v3/account";
const OPEN_ORDERS: &str = "v3/openOrders";
const ALL_ORDERS: &str = "v3/allOrders";
const TEST_ORDER: &str = "v3/order/test";

// Public default request-weight budget per minute
const DEFAULT_WEIGHT_PER_MINUTE: u32 = 1200;

type HmacSha256 = Hmac<Sha256>;

type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

#[derive(Clone)]
pub struct BinanceCredentials {
    pub api_key: String,
    pub api_secret: String,
}

impl fmt::Debug for BinanceCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinanceCredentials")
            .field("api_key", &"***REDACTED***")
            .field("api_secret", &"***REDACTED***")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    symbol: String,
    price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStats24h {
    symbol: String,
    price_change: String,
    price_change_percent: String,
    weighted_avg_price: String,
    prev_close_price: String,
    last_price: String,
}

/// 24 hour rolling price statistics
#[derive(Debug, Clone, PartialEq)]
pub struct Stats24h {
    pub symbol: String,
    pub price_change: f64,
    pub price_change_percent: f64,
    pub weighted_avg_price: f64,
    pub prev_close_price: f64,
    pub last_price: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRecord {
    pub symbol: String,
    pub order_id: i64,
    #[serde(default)]
    pub client_order_id: String,
    pub price: String,
    pub orig_qty: String,
    pub executed_qty: String,
    pub status: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub side: String,
    #[serde(default)]
    pub time: i64,
}

/// Acknowledgement for a submitted order
///
/// The test-order endpoint answers with an empty object, so every field is
/// optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderAck {
    pub symbol: Option<String>,
    pub order_id: Option<i64>,
    pub client_order_id: Option<String>,
    pub transact_time: Option<i64>,
    pub status: Option<String>,
    pub executed_qty: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BinanceErrorBody {
    code: i64,
    msg: String,
}

/// REST client for the Binance spot API
///
/// Requests share one rate limiter sized to the exchange's request-weight
/// budget. Signed endpoints need credentials.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    credentials: Option<BinanceCredentials>,
    recv_window_ms: u64,
    rate_limiter: Arc<BinanceRateLimiter>,
}

impl BinanceClient {
    pub fn new(
        base_url: &str,
        credentials: Option<BinanceCredentials>,
        recv_window_ms: u64,
        timeout: Duration,
    ) -> ApiResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let quota = Quota::per_minute(
            NonZeroU32::new(DEFAULT_WEIGHT_PER_MINUTE).unwrap_or(NonZeroU32::MIN),
        );

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            recv_window_ms,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    pub fn from_config(config: &TraderConfig) -> ApiResult<Self> {
        let credentials = if config.api_key.is_empty() || config.api_secret.is_empty() {
            None
        } else {
            Some(BinanceCredentials {
                api_key: config.api_key.clone(),
                api_secret: config.api_secret.clone(),
            })
        };

        Self::new(
            &config.exchange_base_url,
            credentials,
            config.recv_window_ms,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    /// Resize the request budget from published exchange limits
    pub fn with_limits(mut self, limits: &ExchangeLimits) -> Self {
        if let Some(weight) = limits
            .request_weight_per_minute()
            .and_then(NonZeroU32::new)
        {
            self.rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(weight)));
        }
        self
    }

    pub async fn get_24hr_stats(&self, symbol: &str) -> ApiResult<Stats24h> {
        let raw: RawStats24h = self
            .public_get(TICKER_24HR, &[("symbol", symbol.to_string())])
            .await?;

        Ok(Stats24h {
            symbol: raw.symbol,
            price_change: raw.price_change.parse()?,
            price_change_percent: raw.price_change_percent.parse()?,
            weighted_avg_price: raw.weighted_avg_price.parse()?,
            prev_close_price: raw.prev_close_price.parse()?,
            last_price: raw.last_price.parse()?,
        })
    }

    /// Open orders, for one symbol or (at higher request weight) all
    pub async fn get_open_orders(&self, symbol: Option<&str>) -> ApiResult<Vec<OrderRecord>> {
        let params: Vec<(&str, String)> = symbol
            .map(|s| vec![("symbol", s.to_string())])
            .unwrap_or_default();
        self.signed_get(OPEN_ORDERS, &params).await
    }

    pub async fn get_all_orders(&self, symbol: &str) -> ApiResult<Vec<OrderRecord>> {
        self.signed_get(ALL_ORDERS, &[("symbol", symbol.to_string())])
            .await
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }

    fn credentials(&self) -> ApiResult<&BinanceCredentials> {
        self.credentials.as_ref().ok_or(ApiError::MissingCredentials)
    }

    fn sign(secret: &str, query: &str) -> ApiResult<String> {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| ApiError::Parse(format!("invalid signing key: {}", e)))?;
        mac.update(query.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn build_query(params: &[(&str, String)]) -> String {
        params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }

    fn signed_query(&self, params: &[(&str, String)]) -> ApiResult<String> {
        let credentials = self.credentials()?;

        let mut all_params = params.to_vec();
        all_params.push(("recvWindow", self.recv_window_ms.to_string()));
        all_params.push(("timestamp", Utc::now().timestamp_millis().to_string()));

        let query = Self::build_query(&all_params);
        let signature = Self::sign(&credentials.api_secret, &query)?;
        Ok(format!("{}&signature={}", query, signature))
    }

    async fn public_get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> ApiResult<T> {
        let query = Self::build_query(params);
        let url = if query.is_empty() {
            self.url(endpoint)
        } else {
            format!("{}?{}", self.url(endpoint), query)
        };

        self.rate_limiter.until_ready().await;
        tracing::debug!("GET {}", endpoint);
        let response = self.client.get(&url).send().await?;
        Self::handle_response(response).await
    }

    async fn signed_get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> ApiResult<T> {
        let query = self.signed_query(params)?;
        let api_key = &self.credentials()?.api_key;

        self.rate_limiter.until_ready().await;
        tracing::debug!("GET (signed) {}", endpoint);
        let response = self
            .client
            .get(format!("{}?{}", self.url(endpoint), query))
            .header("X-MBX-APIKEY", api_key)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    async fn signed_post<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> ApiResult<T> {
        let query = self.signed_query(params)?;
        let api_key = &self.credentials()?.api_key;

        self.rate_limiter.until_ready().await;
        tracing::debug!("POST (signed) {}", endpoint);
        let response = self
            .client
            .post(format!("{}?{}", self.url(endpoint), query))
            .header("X-MBX-APIKEY", api_key)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> ApiResult<T> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            if let Ok(err) = serde_json::from_str::<BinanceErrorBody>(&body) {
                return Err(ApiError::Exchange {
                    code: err.code,
                    message: err.msg,
                });
            }
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

/// Format a quantity without float noise, at most 8 decimals
fn format_amount(value: f64) -> String {
    let formatted = format!("{:.8}", value);
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl Exchange for BinanceClient {
    async fn get_price(&self, symbol: &str) -> ApiResult<PriceSample> {
        let ticker: TickerPrice = self
            .public_get(TICKER_PRICE, &[("symbol", symbol.to_string())])
            .await?;
        let price: f64 = ticker.price.parse()?;
        Ok(PriceSample::new(ticker.symbol, price))
    }

    async fn get_account_snapshot(&self) -> ApiResult<AccountSnapshot> {
        self.signed_get(ACCOUNT, &[]).await
    }

    async fn get_exchange_limits(&self) -> ApiResult<ExchangeLimits> {
        self.public_get(EXCHANGE_INFO, &[]).await
    }

    /// Places a LIMIT/GTC order on the test endpoint; nothing reaches the book
    async fn submit_order(&self, order: &OrderRequest) -> ApiResult<OrderAck> {
        let params = [
            ("symbol", order.symbol.clone()),
            ("side", order.side.as_str().to_string()),
            ("type", "LIMIT".to_string()),
            ("timeInForce", "GTC".to_string()),
            ("quantity", format_amount(order.quantity)),
            ("price", format_amount(order.price)),
            ("newOrderRespType", "RESULT".to_string()),
        ];
        self.signed_post(TEST_ORDER, &params).await
    }
}
