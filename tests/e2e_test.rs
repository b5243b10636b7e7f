use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use traderbot::api::{ApiError, ApiResult, Exchange, OrderAck};
use traderbot::bot::{Bot, BotError, SummaryReporter};
use traderbot::config::TraderConfig;
use traderbot::metrics::InitialBalanceStore;
use traderbot::notify::{NotifyResult, Summary, SummarySink};
use traderbot::trader::{BuyDecision, FeeBuyDecision, SellDecision, SellDiffFormula, SkipReason, Trader};
use traderbot::{
    AccountSnapshot, AssetBalance, ExchangeLimits, OrderRequest, PriceSample, RateLimit, TradeSide,
};

/// In-memory exchange that replays scripted prices
///
/// Each symbol pops its next price per request and repeats the last one
/// once the script runs out.
#[derive(Default)]
struct ScriptedExchange {
    prices: Mutex<HashMap<String, VecDeque<f64>>>,
    last_prices: Mutex<HashMap<String, f64>>,
    account: Mutex<Option<AccountSnapshot>>,
    submitted: Mutex<Vec<OrderRequest>>,
    limit_requests: Mutex<usize>,
    failing: AtomicBool,
}

impl ScriptedExchange {
    fn new(account: AccountSnapshot) -> Self {
        let exchange = Self::default();
        *exchange.account.lock().unwrap() = Some(account);
        exchange
    }

    fn with_prices(self, symbol: &str, prices: &[f64]) -> Self {
        self.prices
            .lock()
            .unwrap()
            .insert(symbol.to_string(), prices.iter().copied().collect());
        self
    }

    fn submitted(&self) -> Vec<OrderRequest> {
        self.submitted.lock().unwrap().clone()
    }

    fn fail_requests(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_failing(&self) -> ApiResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ApiError::Status {
                status: 503,
                body: "maintenance".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Exchange for ScriptedExchange {
    async fn get_price(&self, symbol: &str) -> ApiResult<PriceSample> {
        self.check_failing()?;

        let next = self
            .prices
            .lock()
            .unwrap()
            .get_mut(symbol)
            .and_then(|script| script.pop_front());

        let mut last_prices = self.last_prices.lock().unwrap();
        let price = match next {
            Some(price) => {
                last_prices.insert(symbol.to_string(), price);
                price
            }
            None => *last_prices.get(symbol).ok_or_else(|| ApiError::Exchange {
                code: -1121,
                message: "Invalid symbol.".to_string(),
            })?,
        };

        Ok(PriceSample::new(symbol, price))
    }

    async fn get_account_snapshot(&self) -> ApiResult<AccountSnapshot> {
        self.check_failing()?;
        Ok(self.account.lock().unwrap().clone().unwrap_or(AccountSnapshot {
            can_trade: true,
            balances: vec![],
        }))
    }

    async fn get_exchange_limits(&self) -> ApiResult<ExchangeLimits> {
        self.check_failing()?;
        *self.limit_requests.lock().unwrap() += 1;
        Ok(ExchangeLimits {
            rate_limits: vec![RateLimit {
                rate_limit_type: "REQUEST_WEIGHT".to_string(),
                interval: "MINUTE".to_string(),
                limit: 1200,
            }],
        })
    }

    async fn submit_order(&self, order: &OrderRequest) -> ApiResult<OrderAck> {
        self.check_failing()?;
        self.submitted.lock().unwrap().push(order.clone());
        Ok(OrderAck::default())
    }
}

#[derive(Default)]
struct RecordingSink {
    summaries: Mutex<Vec<Summary>>,
}

#[async_trait]
impl SummarySink for RecordingSink {
    async fn send_summary(&self, summary: &Summary) -> NotifyResult<()> {
        self.summaries.lock().unwrap().push(summary.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

fn account(btc: &str, bnb: &str, usdt: &str) -> AccountSnapshot {
    AccountSnapshot {
        can_trade: true,
        balances: vec![
            AssetBalance::new("BTC", btc, "0.00000000"),
            AssetBalance::new("BNB", bnb, "0.00000000"),
            AssetBalance::new("USDT", usdt, "0.00"),
        ],
    }
}

fn config(state: &tempfile::TempDir) -> TraderConfig {
    TraderConfig {
        sell_diff_formula: SellDiffFormula::Ratio,
        loop_interval_secs: 1,
        state_dir: state.path().join("state"),
        metrics_dir: state.path().join("metrics"),
        ..TraderConfig::default()
    }
}

fn bot(exchange: &Arc<ScriptedExchange>, config: TraderConfig) -> Bot {
    let trader = Arc::new(Trader::new(config.trading_params()));
    Bot::new(trader, exchange.clone(), config)
}

#[tokio::test]
async fn test_buy_after_drop_and_reversal() {
    let _ = tracing_subscriber::fmt::try_init();
    let dir = tempfile::tempdir().unwrap();

    let exchange = Arc::new(
        ScriptedExchange::new(account("0", "20", "100")).with_prices("BTCUSDT", &[100.0, 95.0, 97.0]),
    );
    let bot = bot(&exchange, config(&dir));
    bot.initialize().await.unwrap();

    let first = bot.tick().await.unwrap();
    assert!(first.limits_refreshed);
    assert_eq!(first.buy, Some(BuyDecision::Skip(SkipReason::BasePriceInitialized)));
    // Nothing to sell: no base balance above the floor
    assert_eq!(first.sell, None);
    assert_eq!(first.skipped(), vec!["buy: base price initialized".to_string()]);

    let second = bot.tick().await.unwrap();
    assert!(!second.limits_refreshed);
    assert_eq!(second.buy, Some(BuyDecision::Skip(SkipReason::TrackingReversal)));

    let third = bot.tick().await.unwrap();
    match third.buy {
        Some(BuyDecision::Buy(position)) => {
            assert_eq!(position.price, 95.0);
            assert_eq!(position.quantity, 5.0 / 97.0);
        }
        other => panic!("expected a buy, got {:?}", other),
    }
    assert_eq!(third.orders.len(), 1);
    assert_eq!(third.orders_submitted, 0);

    assert!(exchange.submitted().is_empty());
    assert_eq!(*exchange.limit_requests.lock().unwrap(), 1);
    assert_eq!(bot.trader().open_positions().unwrap().len(), 1);
    assert_eq!(bot.trader().counters().unwrap().base_buys, 1);
}

#[tokio::test]
async fn test_buy_then_matched_sell_submits_orders() {
    let dir = tempfile::tempdir().unwrap();
    let exchange = Arc::new(
        ScriptedExchange::new(account("1.0", "20", "100"))
            .with_prices("BTCUSDT", &[100.0, 95.0, 97.0]),
    );
    let bot = bot(
        &exchange,
        TraderConfig {
            submit_orders: true,
            ..config(&dir)
        },
    );
    bot.initialize().await.unwrap();
    assert_eq!(bot.trader().min_balance().unwrap(), 0.75);

    bot.tick().await.unwrap();
    bot.tick().await.unwrap();
    let report = bot.tick().await.unwrap();

    let bought = match &report.buy {
        Some(BuyDecision::Buy(position)) => position.clone(),
        other => panic!("expected a buy, got {:?}", other),
    };
    match &report.sell {
        Some(SellDecision::Sell(intent)) => {
            assert_eq!(intent.price, 97.0);
            assert_eq!(intent.quantity, bought.quantity);
            assert_eq!(intent.matched.as_ref().map(|p| p.id), Some(bought.id));
        }
        other => panic!("expected a sell, got {:?}", other),
    }
    // Fee balance is above target
    assert_eq!(report.fee_buy, None);

    let submitted = exchange.submitted();
    assert_eq!(report.orders_submitted, 2);
    assert_eq!(submitted.len(), 2);
    assert_eq!(submitted[0].side, TradeSide::Buy);
    assert_eq!(submitted[1].side, TradeSide::Sell);
    assert!(bot.trader().open_positions().unwrap().is_empty());
}

#[tokio::test]
async fn test_fee_asset_topped_up_when_low() {
    let dir = tempfile::tempdir().unwrap();
    let exchange = Arc::new(
        ScriptedExchange::new(account("1.0", "1.5", "0"))
            .with_prices("BTCUSDT", &[100.0])
            .with_prices("BNBBTC", &[0.002, 0.0019, 0.00195]),
    );
    let bot = bot(&exchange, config(&dir));
    bot.initialize().await.unwrap();

    let first = bot.tick().await.unwrap();
    // Quote balance cannot cover a buy
    assert_eq!(first.buy, None);
    assert_eq!(
        first.fee_buy,
        Some(FeeBuyDecision::Skip(SkipReason::BasePriceInitialized))
    );

    bot.tick().await.unwrap();
    let third = bot.tick().await.unwrap();

    assert_eq!(
        third.fee_buy,
        Some(FeeBuyDecision::Buy {
            symbol: "BNBBTC".to_string(),
            price: 0.00195,
            quantity: 5.0 / 100.0 / 0.00195,
        })
    );
    assert_eq!(bot.trader().counters().unwrap().fee_buys, 1);
    // Fee buys never become open positions
    assert!(bot.trader().open_positions().unwrap().is_empty());
}

#[tokio::test]
async fn test_exchange_failure_aborts_tick() {
    let dir = tempfile::tempdir().unwrap();
    let exchange = Arc::new(
        ScriptedExchange::new(account("0", "20", "100")).with_prices("BTCUSDT", &[100.0, 95.0]),
    );
    let bot = bot(&exchange, config(&dir));
    bot.initialize().await.unwrap();

    bot.tick().await.unwrap();
    exchange.fail_requests(true);
    let result = bot.tick().await;
    assert!(matches!(result, Err(BotError::Api(ApiError::Status { status: 503, .. }))));

    exchange.fail_requests(false);
    let report = bot.tick().await.unwrap();
    assert_eq!(report.buy, Some(BuyDecision::Skip(SkipReason::TrackingReversal)));
}

#[tokio::test]
async fn test_locked_account_keeps_previous_balances() {
    let dir = tempfile::tempdir().unwrap();
    let exchange = Arc::new(
        ScriptedExchange::new(account("1.0", "20", "100")).with_prices("BTCUSDT", &[100.0]),
    );
    let bot = bot(&exchange, config(&dir));
    bot.initialize().await.unwrap();

    *exchange.account.lock().unwrap() = Some(AccountSnapshot {
        can_trade: false,
        ..account("4.0", "0", "0")
    });
    bot.tick().await.unwrap();

    assert_eq!(bot.trader().base_balance().unwrap(), 1.0);
    assert_eq!(bot.trader().quote_balance().unwrap(), 100.0);
    assert_eq!(bot.trader().min_balance().unwrap(), 0.75);
    assert!(bot.trader().can_buy().unwrap());
}

#[tokio::test]
async fn test_floor_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let exchange = Arc::new(
        ScriptedExchange::new(account("1.0", "20", "100")).with_prices("BTCUSDT", &[100.0]),
    );

    let first_run = bot(&exchange, config(&dir));
    first_run.initialize().await.unwrap();
    first_run
        .run(tokio::time::sleep(Duration::from_millis(100)))
        .await
        .unwrap();
    assert_eq!(first_run.floor_store().load().unwrap(), Some(0.75));

    // Balance dropped while the bot was down; the floor must not follow it
    *exchange.account.lock().unwrap() = Some(account("0.5", "20", "100"));
    let second_run = bot(&exchange, config(&dir));
    second_run.initialize().await.unwrap();

    assert_eq!(second_run.trader().min_balance().unwrap(), 0.75);
    assert!(!second_run.trader().can_sell().unwrap());
}

#[tokio::test]
async fn test_summary_against_initial_portfolio() {
    let dir = tempfile::tempdir().unwrap();
    let exchange = Arc::new(
        ScriptedExchange::new(account("0.5", "0", "100")).with_prices("BTCUSDT", &[100.0, 120.0]),
    );
    let trader = Arc::new(Trader::default());
    let sink = Arc::new(RecordingSink::default());
    let reporter = SummaryReporter::new(
        trader,
        exchange.clone(),
        InitialBalanceStore::new(dir.path().join("metrics")),
        "USDT",
    )
    .with_sink(sink.clone());

    let first = reporter.send().await.unwrap();
    assert_eq!(first.portfolio_value, 150.0);
    assert_eq!(first.initial_value, 150.0);
    assert_eq!(first.performance.asset("BTC").unwrap().value_increase_abs, 0.0);

    *exchange.account.lock().unwrap() = Some(account("0.5", "0", "50"));
    let second = reporter.send().await.unwrap();
    assert_eq!(second.portfolio_value, 110.0);
    assert_eq!(second.initial_value, 150.0);
    assert_eq!(second.performance.asset("BTC").unwrap().value_increase_percent, 20.0);
    assert_eq!(second.performance.asset("USDT").unwrap().qty_increase_percent, -50.0);

    assert_eq!(sink.summaries.lock().unwrap().len(), 2);
}
