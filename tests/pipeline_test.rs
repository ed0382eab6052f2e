//! End-to-end analysis against in-memory collaborators

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use num_bigint::BigInt;
use reflect_gains::gains::collaborators::{
    BalanceSource, PriceHistorySource, TokenInfoSource, TopCoinsSource, TransactionDetailSource,
    TransferSource,
};
use reflect_gains::gains::format::DisplaySuffix;
use reflect_gains::gains::types::{PriceHistory, TokenSnapshotRecord, WalletBalance};
use reflect_gains::gains::{
    Collaborators, GainsAnalyzer, GainsConfig, GainsError, MemoryPriceCache, RawTransfer, TopCoin,
    TransactionDetail,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const WALLET: &str = "0xwallet";
const TOKEN: &str = "0xtoken";
const PAIR: &str = "0xpair";

#[derive(Default)]
struct FakeChain {
    transfers: Vec<RawTransfer>,
    details: HashMap<String, TransactionDetail>,
    snapshot: TokenSnapshotRecord,
    top_coins: Option<Vec<TopCoin>>,
    balance: BigInt,
    detail_calls: AtomicUsize,
    contracts_seen: Mutex<Vec<String>>,
}

#[async_trait]
impl TransferSource for FakeChain {
    async fn fetch_transfers(&self, _wallet: &str, contract: &str) -> Result<Vec<RawTransfer>> {
        self.contracts_seen.lock().unwrap().push(contract.to_string());
        Ok(self.transfers.clone())
    }
}

#[async_trait]
impl TransactionDetailSource for FakeChain {
    async fn fetch_transaction(&self, hash: &str) -> Result<TransactionDetail> {
        self.detail_calls.fetch_add(1, Ordering::SeqCst);
        self.details
            .get(hash)
            .cloned()
            .ok_or_else(|| anyhow!("indexer timed out"))
    }
}

#[async_trait]
impl PriceHistorySource for FakeChain {
    async fn fetch_history(&self, _symbol: &str, _timestamp_ms: i64) -> Result<PriceHistory> {
        Err(anyhow!("no history in this fixture"))
    }
}

#[async_trait]
impl TokenInfoSource for FakeChain {
    async fn fetch_token_snapshot(&self, _contract: &str) -> Result<TokenSnapshotRecord> {
        Ok(self.snapshot.clone())
    }
}

#[async_trait]
impl TopCoinsSource for FakeChain {
    async fn fetch_top_coins(&self) -> Result<Vec<TopCoin>> {
        self.top_coins.clone().ok_or_else(|| anyhow!("rate limited"))
    }
}

#[async_trait]
impl BalanceSource for FakeChain {
    async fn fetch_balance(&self, _wallet: &str, _contract: &str) -> Result<WalletBalance> {
        Ok(WalletBalance {
            raw: self.balance.clone(),
            decimals: self.snapshot.decimals,
        })
    }
}

fn whole_tokens(tokens: u64) -> String {
    format!("{}000000000000000000", tokens)
}

fn transfer(hash: &str, from: &str, to: &str, tokens: u64, timestamp: u64) -> RawTransfer {
    RawTransfer {
        hash: hash.to_string(),
        block_number: "7000000".to_string(),
        timestamp: timestamp.to_string(),
        from: from.to_string(),
        to: to.to_string(),
        value: whole_tokens(tokens),
        token_decimal: "18".to_string(),
        token_symbol: "RFX".to_string(),
    }
}

fn quoted(usd: f64) -> TransactionDetail {
    serde_json::from_value(json!({
        "value_quote": usd,
        "from_address": WALLET,
        "gas_quote_rate": 300.0,
        "log_events": []
    }))
    .unwrap()
}

fn top_coins() -> Vec<TopCoin> {
    vec![
        TopCoin { name: Some("Bitcoin".into()), code: "BTC".into(), cap: Some(1_000_000.0) },
        TopCoin { name: Some("Ether".into()), code: "ETH".into(), cap: Some(100_000.0) },
    ]
}

/// Two buys of 1000 and 2000 tokens for $10 and $40, and a live balance of
/// 3150 tokens at $0.05.
fn two_buys() -> FakeChain {
    let mut details = HashMap::new();
    details.insert("0xbuy1".to_string(), quoted(10.0));
    details.insert("0xbuy2".to_string(), quoted(40.0));
    FakeChain {
        transfers: vec![
            transfer("0xbuy1", PAIR, "0xWALLET", 1000, 1_620_000_000),
            transfer("0xbuy2", PAIR, WALLET, 2000, 1_620_086_400),
        ],
        details,
        snapshot: TokenSnapshotRecord {
            name: Some("Reflex".into()),
            symbol: "RFX".into(),
            decimals: 18,
            price: "0.05".into(),
            supply: whole_tokens(1_000_000),
        },
        top_coins: Some(top_coins()),
        balance: whole_tokens(3150).parse().unwrap(),
        ..Default::default()
    }
}

fn analyzer(chain: Arc<FakeChain>) -> GainsAnalyzer {
    let collaborators = Collaborators {
        transfers: chain.clone(),
        details: chain.clone(),
        history: chain.clone(),
        token_info: chain.clone(),
        top_coins: chain.clone(),
        balances: chain,
    };
    let config = GainsConfig::default().with_comparison_rank(2);
    GainsAnalyzer::new(config, collaborators, Arc::new(MemoryPriceCache::default()))
}

#[tokio::test]
async fn test_reflection_gains_end_to_end() {
    let chain = Arc::new(two_buys());
    let analyzer = analyzer(chain.clone());

    let report = analyzer.analyze(TOKEN, WALLET).await.expect("analysis failed");

    let basis = &report.cost_basis;
    assert_eq!(basis.net_balance.to_string(), "3000.0");
    assert_eq!(basis.total_bought.to_string(), "3000.0");
    assert!(basis.total_sold.is_zero());
    assert_eq!(basis.total_spent_usd.to_currency_string(), "50.00");
    assert_eq!(
        basis.average_cost_basis_per_token.as_ref().unwrap().to_currency_string(),
        "0.01"
    );
    assert_eq!(report.unresolved_prices, 0);

    assert_eq!(report.gains.to_string(), "150.0");
    assert_eq!(report.balance_usd.to_currency_string(), "157.50");
    assert_eq!(report.gains_usd.to_currency_string(), "7.50");
    assert_eq!(report.market_cap_usd.to_currency_string(), "50,000.00");
    assert_eq!(report.supply_share.as_ref().unwrap().to_string(), "31.5");
    assert_eq!(report.earnings_percent.as_ref().unwrap().to_currency_string(), "215.00");
    assert_eq!(report.display_suffix, DisplaySuffix::Thousands);

    let projection = report.comparison.as_ref().expect("no projection");
    assert_eq!(projection.coin.code, "ETH");
    assert_eq!(projection.projected_usd.to_currency_string(), "315.00");

    let first = &report.transactions[0];
    assert_eq!(first.usd_value.as_ref().unwrap().to_currency_string(), "10.00");
    assert_eq!(first.cost_basis_per_token.as_ref().unwrap().to_string(), "0.01");
}

#[tokio::test]
async fn test_second_run_is_served_from_cache() {
    let chain = Arc::new(two_buys());
    let analyzer = analyzer(chain.clone());

    let first = analyzer.analyze(TOKEN, WALLET).await.unwrap();
    assert_eq!(chain.detail_calls.load(Ordering::SeqCst), 2);

    let second = analyzer.analyze(TOKEN, WALLET).await.unwrap();
    assert_eq!(chain.detail_calls.load(Ordering::SeqCst), 2);
    assert_eq!(first.cost_basis, second.cost_basis);
}

#[tokio::test]
async fn test_unpriced_transaction_counts_as_zero() {
    let mut chain = two_buys();
    chain.details.remove("0xbuy2");
    let analyzer = analyzer(Arc::new(chain));

    let report = analyzer.analyze(TOKEN, WALLET).await.unwrap();

    assert_eq!(report.unresolved_prices, 1);
    assert_eq!(report.cost_basis.net_balance.to_string(), "3000.0");
    assert_eq!(report.cost_basis.total_spent_usd.to_currency_string(), "10.00");
    assert!(report.transactions[1].usd_value.as_ref().unwrap().is_zero());
}

#[tokio::test]
async fn test_sell_reduces_net_balance_and_spend() {
    let mut chain = two_buys();
    chain.transfers.push(transfer("0xsell", WALLET, PAIR, 500, 1_620_172_800));
    chain.details.insert("0xsell".to_string(), quoted(20.0));
    let analyzer = analyzer(Arc::new(chain));

    let report = analyzer.analyze(TOKEN, WALLET).await.unwrap();

    assert_eq!(report.cost_basis.net_balance.to_string(), "2500.0");
    assert_eq!(report.cost_basis.total_sold.to_string(), "500.0");
    assert_eq!(report.cost_basis.total_spent_usd.to_currency_string(), "30.00");
    assert_eq!(report.gains.to_string(), "650.0");
}

#[tokio::test]
async fn test_no_transactions_found() {
    let mut chain = two_buys();
    chain.transfers.clear();
    let analyzer = analyzer(Arc::new(chain));

    let err = analyzer.analyze(TOKEN, WALLET).await.unwrap_err();
    assert!(matches!(err, GainsError::NoTransactionsFound));
}

#[tokio::test]
async fn test_top_coins_failure_is_fatal() {
    let mut chain = two_buys();
    chain.top_coins = None;
    let analyzer = analyzer(Arc::new(chain));

    let err = analyzer.analyze(TOKEN, WALLET).await.unwrap_err();
    assert!(matches!(err, GainsError::CollaboratorUnavailable(_)));
    assert!(err.is_retryable());
    assert!(err.to_string().contains("top coins"));
}

#[tokio::test]
async fn test_empty_wallet_reports_zero_gains() {
    let mut chain = two_buys();
    chain.balance = BigInt::from(0);
    let analyzer = analyzer(Arc::new(chain));

    let report = analyzer.analyze(TOKEN, WALLET).await.unwrap();

    assert!(report.gains.is_zero());
    assert!(report.balance_usd.is_zero());
    assert!(report.gains_usd.is_zero());
    assert_eq!(report.earnings_percent.as_ref().unwrap().to_currency_string(), "-100.00");
}

#[tokio::test]
async fn test_contract_alias_is_resolved() {
    let chain = Arc::new(two_buys());
    let analyzer = analyzer(chain.clone());

    let report = analyzer.analyze("PYE", WALLET).await.unwrap();

    assert_eq!(report.contract, "0xaad87f47cdea777faf87e7602e91e3a6afbe4d57");
    assert_eq!(
        chain.contracts_seen.lock().unwrap().as_slice(),
        ["0xaad87f47cdea777faf87e7602e91e3a6afbe4d57".to_string()]
    );
}
