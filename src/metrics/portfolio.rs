use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{MetricsError, MetricsResult};
use crate::api::{ApiError, Exchange};
use crate::models::AccountSnapshot;

/// One asset held on the exchange, valued in the quote currency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetHolding {
    pub symbol: String,
    pub quantity: f64,
    pub value: f64,
}

/// Everything held on the exchange at one moment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub assets: Vec<AssetHolding>,
    pub value: f64,
    pub updated: DateTime<Utc>,
}

impl Portfolio {
    pub fn holding(&self, symbol: &str) -> Option<&AssetHolding> {
        self.assets.iter().find(|a| a.symbol == symbol)
    }
}

fn parse_amount(asset: &str, raw: &str) -> MetricsResult<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| MetricsError::InvalidAmount {
            asset: asset.to_string(),
            value: raw.to_string(),
        })
}

/// Value an account snapshot with known prices
///
/// `prices` maps asset to its price in `quote_asset`. The quote asset itself
/// is worth 1. Zero holdings and assets with no price are left out.
pub fn build_portfolio(
    account: &AccountSnapshot,
    prices: &HashMap<String, f64>,
    quote_asset: &str,
) -> MetricsResult<Portfolio> {
    let mut assets = Vec::new();
    let mut value = 0.0;

    for balance in &account.balances {
        let quantity =
            parse_amount(&balance.asset, &balance.free)? + parse_amount(&balance.asset, &balance.locked)?;
        if quantity == 0.0 {
            continue;
        }

        let price = if balance.asset == quote_asset {
            1.0
        } else {
            match prices.get(&balance.asset) {
                Some(price) => *price,
                None => {
                    tracing::debug!("No {} price for {}, skipping", quote_asset, balance.asset);
                    continue;
                }
            }
        };

        let holding_value = quantity * price;
        value += holding_value;
        assets.push(AssetHolding {
            symbol: balance.asset.clone(),
            quantity,
            value: holding_value,
        });
    }

    Ok(Portfolio {
        assets,
        value,
        updated: Utc::now(),
    })
}

/// Fetch balances and prices from the exchange and value the portfolio
///
/// Assets the exchange has no `<asset><quote>` market for are skipped.
pub async fn fetch_portfolio(exchange: &dyn Exchange, quote_asset: &str) -> MetricsResult<Portfolio> {
    let account = exchange.get_account_snapshot().await?;
    let mut prices = HashMap::new();

    for balance in &account.balances {
        if balance.asset == quote_asset {
            continue;
        }
        let free = parse_amount(&balance.asset, &balance.free)?;
        let locked = parse_amount(&balance.asset, &balance.locked)?;
        if free + locked == 0.0 {
            continue;
        }

        let symbol = format!("{}{}", balance.asset, quote_asset);
        match exchange.get_price(&symbol).await {
            Ok(sample) => {
                prices.insert(balance.asset.clone(), sample.price);
            }
            Err(ApiError::Exchange { code, message }) => {
                tracing::debug!("No market for {} ({}: {})", symbol, code, message);
            }
            Err(e) => return Err(e.into()),
        }
    }

    build_portfolio(&account, &prices, quote_asset)
}

/// Change of one asset between two portfolios
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetPerformance {
    pub symbol: String,
    pub qty_increase_abs: f64,
    pub qty_increase_percent: f64,
    pub value_increase_abs: f64,
    pub value_increase_percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioPerformance {
    pub assets: Vec<AssetPerformance>,
}

fn percent_change(current: f64, initial: f64) -> f64 {
    if initial == 0.0 {
        100.0
    } else {
        (current - initial) / initial * 100.0
    }
}

impl PortfolioPerformance {
    /// Compare every asset in `current` against `initial`
    ///
    /// Assets that were not held initially count as a 100% increase. Assets
    /// no longer held are ignored.
    pub fn compare(initial: &Portfolio, current: &Portfolio) -> Self {
        let assets = current
            .assets
            .iter()
            .map(|asset| match initial.holding(&asset.symbol) {
                Some(before) => AssetPerformance {
                    symbol: asset.symbol.clone(),
                    qty_increase_abs: asset.quantity - before.quantity,
                    qty_increase_percent: percent_change(asset.quantity, before.quantity),
                    value_increase_abs: asset.value - before.value,
                    value_increase_percent: percent_change(asset.value, before.value),
                },
                None => AssetPerformance {
                    symbol: asset.symbol.clone(),
                    qty_increase_abs: asset.quantity,
                    qty_increase_percent: 100.0,
                    value_increase_abs: asset.value,
                    value_increase_percent: 100.0,
                },
            })
            .collect();

        Self { assets }
    }

    pub fn asset(&self, symbol: &str) -> Option<&AssetPerformance> {
        self.assets.iter().find(|a| a.symbol == symbol)
    }
}
