use governor::{Quota, RateLimiter};
use reqwest::Client;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use super::{ApiError, ApiResult};

pub const COINMARKETCAP_TICKER_API: &str = "https://api.coinmarketcap.com/v2/ticker";
const RATE_LIMIT_RPM: u32 = 30;
const MAX_RETRIES: u32 = 3;

/// CoinMarketCap id for bitcoin
pub const BTC_ID: u32 = 1;
/// CoinMarketCap id for binance coin
pub const BNB_ID: u32 = 1839;

type CoinMarketCapRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

#[derive(Debug, Deserialize)]
struct TickerResponse {
    data: TickerData,
}

#[derive(Debug, Deserialize)]
struct TickerData {
    id: u32,
    name: String,
    symbol: String,
    #[serde(default)]
    rank: u32,
    quotes: TickerQuotes,
}

#[derive(Debug, Deserialize)]
struct TickerQuotes {
    #[serde(rename = "USD")]
    usd: UsdQuote,
}

#[derive(Debug, Deserialize)]
struct UsdQuote {
    price: f64,
    #[serde(default)]
    volume_24h: f64,
    #[serde(default)]
    market_cap: f64,
    #[serde(default)]
    percent_change_1h: f64,
    #[serde(default)]
    percent_change_24h: f64,
    #[serde(default)]
    percent_change_7d: f64,
}

/// USD ticker for one coin
#[derive(Debug, Clone, PartialEq)]
pub struct CoinTicker {
    pub id: u32,
    pub name: String,
    pub symbol: String,
    pub rank: u32,
    pub price_usd: f64,
    pub volume_24h: f64,
    pub market_cap: f64,
    pub percent_change_1h: f64,
    pub percent_change_24h: f64,
    pub percent_change_7d: f64,
}

impl From<TickerData> for CoinTicker {
    fn from(data: TickerData) -> Self {
        let usd = data.quotes.usd;
        Self {
            id: data.id,
            name: data.name,
            symbol: data.symbol,
            rank: data.rank,
            price_usd: usd.price,
            volume_24h: usd.volume_24h,
            market_cap: usd.market_cap,
            percent_change_1h: usd.percent_change_1h,
            percent_change_24h: usd.percent_change_24h,
            percent_change_7d: usd.percent_change_7d,
        }
    }
}

/// CoinMarketCap ticker client with rate limiting
///
/// Cloneable; all clones share the same rate limiter.
#[derive(Clone)]
pub struct CoinMarketCapClient {
    client: Client,
    base_url: String,
    rate_limiter: Arc<CoinMarketCapRateLimiter>,
}

impl CoinMarketCapClient {
    pub fn new(base_url: &str, timeout: Duration) -> ApiResult<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        let quota = Quota::per_minute(NonZeroU32::new(RATE_LIMIT_RPM).unwrap_or(NonZeroU32::MIN));

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    /// Make a rate-limited request, backing off on 429 and 5xx
    async fn make_request(&self, url: &str) -> ApiResult<reqwest::Response> {
        let mut last_error = None;

        for attempt in 1..=MAX_RETRIES {
            self.rate_limiter.until_ready().await;

            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response);
                    }

                    if (status.as_u16() == 429 || status.is_server_error()) && attempt < MAX_RETRIES
                    {
                        let backoff_secs = 2u64.pow(attempt);
                        tracing::warn!(
                            "CoinMarketCap returned {}, retrying in {}s (attempt {}/{})",
                            status,
                            backoff_secs,
                            attempt,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                        continue;
                    }

                    let body = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());
                    return Err(ApiError::Status {
                        status: status.as_u16(),
                        body,
                    });
                }
                Err(e) if attempt < MAX_RETRIES => {
                    let backoff_secs = 2u64.pow(attempt);
                    tracing::warn!(
                        "Network error: {}, retrying in {}s (attempt {}/{})",
                        e,
                        backoff_secs,
                        attempt,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                    last_error = Some(e);
                }
                Err(e) => return Err(ApiError::Http(e)),
            }
        }

        match last_error {
            Some(e) => Err(ApiError::Http(e)),
            None => Err(ApiError::Parse(format!(
                "no response after {} attempts",
                MAX_RETRIES
            ))),
        }
    }

    pub async fn get_ticker(&self, id: u32) -> ApiResult<CoinTicker> {
        let url = format!("{}/{}/", self.base_url, id);
        tracing::debug!("Fetching CoinMarketCap ticker {}", id);

        let response = self.make_request(&url).await?;
        let body = response.text().await?;
        let ticker: TickerResponse = serde_json::from_str(&body)?;

        Ok(ticker.data.into())
    }
}
