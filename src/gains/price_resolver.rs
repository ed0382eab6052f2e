//! Per-transaction USD price resolution.
//!
//! A transaction's price is found by walking an ordered chain of tiers and
//! taking the first non-zero answer:
//!
//! 1. [`DirectQuote`]: the value quote attached to the transaction detail.
//! 2. [`ReferenceAssetTrace`]: how much wrapped native coin moved through the
//!    counterparties of the wallet's token transfers, priced at the native
//!    coin's contemporaneous rate.
//! 3. [`HistoricalRate`]: the wallet's token flow priced at the token's
//!    historical rate.
//!
//! Every completed resolution, zero included, is written to the price cache.
//! Failures are reported per transaction and never abort a batch.

use crate::gains::collaborators::{PriceHistorySource, TransactionDetailSource};
use crate::gains::config::GainsConfig;
use crate::gains::error::GainsError;
use crate::gains::fixed_point::{FixedPoint, UsdAmount, USD_SCALE};
use crate::gains::price_cache::{cache_key, PriceCache, UNRESOLVED_SENTINEL};
use crate::gains::types::{LogEvent, Transaction, TransactionDetail, TransferEvent};
use crate::types::{same_address, Address};
use async_trait::async_trait;
use nonempty::NonEmpty;
use num_bigint::BigInt;
use num_traits::{Signed, Zero};
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, instrument, warn};

/// The token being priced.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceTarget {
    pub contract: Address,
    pub symbol: String,
    pub decimals: u32,
}

/// Everything a tier may look at for one transaction.
pub struct ResolutionContext<'a> {
    pub transaction: &'a Transaction,
    pub detail: &'a TransactionDetail,
    pub target: &'a PriceTarget,
}

impl ResolutionContext<'_> {
    /// The address that signed the transaction.
    pub fn wallet(&self) -> &str {
        &self.detail.from_address
    }

    fn transfers(&self) -> impl Iterator<Item = TransferEvent<'_>> {
        self.detail.log_events.iter().filter_map(LogEvent::as_transfer)
    }

    fn token_transfers(&self) -> impl Iterator<Item = TransferEvent<'_>> {
        let contract = self.target.contract.as_str();
        self.transfers().filter(move |t| t.is_token(contract))
    }

    fn unresolved(&self, reason: impl ToString) -> GainsError {
        GainsError::unresolved(&self.transaction.hash, reason)
    }
}

/// One strategy in the fallback chain. `Ok(None)` hands over to the next
/// tier; an error ends resolution for this transaction.
#[async_trait]
pub trait PriceTier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn resolve(&self, ctx: &ResolutionContext<'_>) -> Result<Option<UsdAmount>, GainsError>;
}

fn non_zero(value: UsdAmount) -> Option<UsdAmount> {
    if value.is_zero() {
        None
    } else {
        Some(value)
    }
}

/// Tier 1: the quote the indexer already attached to the transaction.
pub struct DirectQuote;

#[async_trait]
impl PriceTier for DirectQuote {
    fn name(&self) -> &'static str {
        "direct-quote"
    }

    async fn resolve(&self, ctx: &ResolutionContext<'_>) -> Result<Option<UsdAmount>, GainsError> {
        let Some(quote) = ctx.detail.value_quote else {
            return Ok(None);
        };
        let value = FixedPoint::from_f64(quote, USD_SCALE).map_err(|e| ctx.unresolved(e))?;
        Ok(non_zero(value.abs()))
    }
}

/// Tier 2: trace the wrapped native coin through the swap.
///
/// Counterparties that sent the analyzed token to the wallet are buy
/// counterparties; those that received it from the wallet are sell
/// counterparties. Reference-asset transfers into a buy counterparty add to
/// the net flow, transfers out of a sell counterparty subtract. The absolute
/// net is priced at the transaction's gas quote rate.
pub struct ReferenceAssetTrace {
    reference_symbol: String,
    reference_decimals: u32,
}

impl ReferenceAssetTrace {
    pub fn new(reference_symbol: impl Into<String>, reference_decimals: u32) -> Self {
        Self {
            reference_symbol: reference_symbol.into(),
            reference_decimals,
        }
    }

    /// Signed reference-asset flow in raw units.
    pub fn net_reference_flow(&self, ctx: &ResolutionContext<'_>) -> BigInt {
        let wallet = ctx.wallet();
        let mut buy_counterparties = Vec::new();
        let mut sell_counterparties = Vec::new();
        for transfer in ctx.token_transfers() {
            if same_address(transfer.from, wallet) {
                sell_counterparties.push(transfer.to);
            } else if same_address(transfer.to, wallet) {
                buy_counterparties.push(transfer.from);
            }
        }

        let reference_transfers: Vec<TransferEvent<'_>> = ctx
            .transfers()
            .filter(|t| t.ticker == Some(self.reference_symbol.as_str()))
            .collect();

        let mut net = BigInt::zero();
        for counterparty in &buy_counterparties {
            for transfer in reference_transfers.iter().filter(|t| same_address(t.to, counterparty)) {
                net += &transfer.amount;
            }
        }
        for counterparty in &sell_counterparties {
            for transfer in reference_transfers.iter().filter(|t| same_address(t.from, counterparty)) {
                net -= &transfer.amount;
            }
        }
        net
    }
}

#[async_trait]
impl PriceTier for ReferenceAssetTrace {
    fn name(&self) -> &'static str {
        "reference-asset-trace"
    }

    async fn resolve(&self, ctx: &ResolutionContext<'_>) -> Result<Option<UsdAmount>, GainsError> {
        let Some(native_rate) = ctx.detail.gas_quote_rate else {
            return Ok(None);
        };
        let net = self.net_reference_flow(ctx);
        if net.is_zero() {
            return Ok(None);
        }

        let rate = FixedPoint::from_f64(native_rate, USD_SCALE).map_err(|e| ctx.unresolved(e))?;
        let amount = FixedPoint::from_raw(net.abs(), self.reference_decimals);
        Ok(non_zero((&rate * &amount).rescale(USD_SCALE)))
    }
}

/// Tier 3: the token amount moved in or out of the wallet, priced at the
/// token's historical rate for the transaction time.
pub struct HistoricalRate {
    history: Arc<dyn PriceHistorySource>,
}

impl HistoricalRate {
    pub fn new(history: Arc<dyn PriceHistorySource>) -> Self {
        Self { history }
    }

    /// Gross token amount in raw units across every wallet transfer.
    pub fn wallet_token_flow(ctx: &ResolutionContext<'_>) -> BigInt {
        let wallet = ctx.wallet();
        ctx.token_transfers()
            .filter(|t| same_address(t.from, wallet) || same_address(t.to, wallet))
            .fold(BigInt::zero(), |acc, t| acc + t.amount)
    }
}

#[async_trait]
impl PriceTier for HistoricalRate {
    fn name(&self) -> &'static str {
        "historical-rate"
    }

    async fn resolve(&self, ctx: &ResolutionContext<'_>) -> Result<Option<UsdAmount>, GainsError> {
        let tokens = Self::wallet_token_flow(ctx);
        if tokens.is_zero() {
            return Ok(None);
        }

        let history = self
            .history
            .fetch_history(&ctx.target.symbol, ctx.transaction.timestamp_ms())
            .await
            .map_err(|e| ctx.unresolved(format!("price history: {:#}", e)))?;
        let rate = history
            .history
            .first()
            .and_then(|point| point.rate)
            .ok_or_else(|| ctx.unresolved("no historical rate"))?;

        let rate = FixedPoint::from_f64(rate, USD_SCALE).map_err(|e| ctx.unresolved(e))?;
        let amount = FixedPoint::from_raw(tokens, ctx.target.decimals);
        Ok(non_zero((&rate * &amount).rescale(USD_SCALE)))
    }
}

/// Cache-aware orchestrator over the tier chain.
pub struct PriceResolver {
    cache: Arc<dyn PriceCache>,
    details: Arc<dyn TransactionDetailSource>,
    tiers: NonEmpty<Box<dyn PriceTier>>,
    cache_writes: Mutex<()>,
}

impl PriceResolver {
    /// Resolver with the standard three-tier chain.
    pub fn new(
        cache: Arc<dyn PriceCache>,
        details: Arc<dyn TransactionDetailSource>,
        history: Arc<dyn PriceHistorySource>,
        config: &GainsConfig,
    ) -> Self {
        let mut tiers: NonEmpty<Box<dyn PriceTier>> = NonEmpty::new(Box::new(DirectQuote));
        tiers.push(Box::new(ReferenceAssetTrace::new(
            config.reference_symbol.clone(),
            config.reference_decimals,
        )));
        tiers.push(Box::new(HistoricalRate::new(history)));
        Self::with_tiers(cache, details, tiers)
    }

    pub fn with_tiers(
        cache: Arc<dyn PriceCache>,
        details: Arc<dyn TransactionDetailSource>,
        tiers: NonEmpty<Box<dyn PriceTier>>,
    ) -> Self {
        Self {
            cache,
            details,
            tiers,
            cache_writes: Mutex::new(()),
        }
    }

    pub fn tier_names(&self) -> Vec<&'static str> {
        self.tiers.iter().map(|tier| tier.name()).collect()
    }

    /// Cached price for `hash`, if a non-sentinel entry exists.
    pub async fn cached_price(&self, hash: &str) -> Option<UsdAmount> {
        let key = cache_key(hash);
        match self.cache.get(&key).await {
            Ok(Some(value)) if value != UNRESOLVED_SENTINEL => match value.parse::<FixedPoint>() {
                Ok(price) => Some(price.rescale(USD_SCALE)),
                Err(e) => {
                    warn!("Ignoring unreadable price cache entry {}: {}", key, e);
                    None
                }
            },
            Ok(_) => None,
            Err(e) => {
                warn!("Price cache read failed for {}: {:#}", key, e);
                None
            }
        }
    }

    /// Resolves the USD value of one transaction.
    #[instrument(skip(self, transaction, target), fields(hash = %transaction.hash))]
    pub async fn resolve(
        &self,
        transaction: &Transaction,
        target: &PriceTarget,
    ) -> Result<UsdAmount, GainsError> {
        if let Some(price) = self.cached_price(&transaction.hash).await {
            debug!("Price cache hit: {}", price);
            return Ok(price);
        }

        let detail = self
            .details
            .fetch_transaction(&transaction.hash)
            .await
            .map_err(|e| GainsError::unresolved(&transaction.hash, format!("transaction detail: {:#}", e)))?;
        let ctx = ResolutionContext {
            transaction,
            detail: &detail,
            target,
        };

        let mut resolved = None;
        for tier in self.tiers.iter() {
            if let Some(value) = tier.resolve(&ctx).await? {
                debug!(tier = tier.name(), "Resolved price {}", value);
                resolved = Some(value);
                break;
            }
        }

        let price = resolved.unwrap_or_else(|| {
            debug!("No tier produced a price");
            FixedPoint::zero(USD_SCALE)
        });
        self.store(&transaction.hash, &price).await;
        Ok(price)
    }

    async fn store(&self, hash: &str, price: &UsdAmount) {
        let value = if price.is_zero() {
            UNRESOLVED_SENTINEL.to_string()
        } else {
            price.to_string()
        };
        let _guard = self.cache_writes.lock().await;
        if let Err(e) = self.cache.set(&cache_key(hash), &value).await {
            warn!("Failed to cache price for {}: {:#}", hash, e);
        }
    }

    /// Prices every transaction in place with at most `max_parallel`
    /// resolutions in flight. Transactions that fail to resolve are priced
    /// at zero. Returns how many failed.
    pub async fn resolve_all(
        self: &Arc<Self>,
        transactions: &mut [Transaction],
        target: &PriceTarget,
        max_parallel: usize,
    ) -> usize {
        let semaphore = Arc::new(Semaphore::new(max_parallel.max(1)));
        let mut tasks = JoinSet::new();
        for (index, transaction) in transactions.iter().enumerate() {
            let resolver = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            let transaction = transaction.clone();
            let target = target.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                (index, resolver.resolve(&transaction, &target).await)
            });
        }

        let mut unresolved = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(price))) => transactions[index].apply_price(price),
                Ok((index, Err(e))) => {
                    warn!("{}; counting it as $0", e);
                    unresolved += 1;
                    transactions[index].apply_price(FixedPoint::zero(USD_SCALE));
                }
                Err(e) => error!("Price resolution task failed: {}", e),
            }
        }

        for transaction in transactions.iter_mut().filter(|t| t.usd_value.is_none()) {
            unresolved += 1;
            transaction.apply_price(FixedPoint::zero(USD_SCALE));
        }
        unresolved
    }
}
