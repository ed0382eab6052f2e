//! Contracts for the external collaborators the pipeline depends on.
//!
//! Implementations own their transport concerns (timeouts, retries, rate
//! limits). The pipeline only sees a value or an error.

use crate::gains::types::{
    PriceHistory, RawTransfer, TokenSnapshotRecord, TopCoin, TransactionDetail, WalletBalance,
};
use anyhow::Result;
use async_trait::async_trait;

/// Transfer history of one token for one wallet.
#[async_trait]
pub trait TransferSource: Send + Sync {
    async fn fetch_transfers(&self, wallet: &str, contract: &str) -> Result<Vec<RawTransfer>>;
}

/// Full transaction detail with decoded log events.
#[async_trait]
pub trait TransactionDetailSource: Send + Sync {
    async fn fetch_transaction(&self, hash: &str) -> Result<TransactionDetail>;
}

/// Historical USD rate of a symbol around a point in time.
#[async_trait]
pub trait PriceHistorySource: Send + Sync {
    async fn fetch_history(&self, symbol: &str, timestamp_ms: i64) -> Result<PriceHistory>;
}

/// Current token metadata, price and circulating supply.
#[async_trait]
pub trait TokenInfoSource: Send + Sync {
    async fn fetch_token_snapshot(&self, contract: &str) -> Result<TokenSnapshotRecord>;
}

/// Reference list of top coins ordered by rank.
#[async_trait]
pub trait TopCoinsSource: Send + Sync {
    async fn fetch_top_coins(&self) -> Result<Vec<TopCoin>>;
}

/// Live token balance of a wallet.
#[async_trait]
pub trait BalanceSource: Send + Sync {
    async fn fetch_balance(&self, wallet: &str, contract: &str) -> Result<WalletBalance>;
}
