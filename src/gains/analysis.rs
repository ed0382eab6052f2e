//! End-to-end gains analysis for one wallet and one token.

use crate::gains::aggregator::aggregate;
use crate::gains::collaborators::{
    BalanceSource, PriceHistorySource, TokenInfoSource, TopCoinsSource, TransactionDetailSource,
    TransferSource,
};
use crate::gains::config::GainsConfig;
use crate::gains::data_sources::HttpDataSources;
use crate::gains::error::GainsError;
use crate::gains::fixed_point::{FixedPoint, USD_SCALE};
use crate::gains::format::DisplaySuffix;
use crate::gains::normalizer::normalize;
use crate::gains::price_cache::PriceCache;
use crate::gains::price_resolver::{PriceResolver, PriceTarget};
use crate::gains::types::{AnalysisReport, TokenSnapshot};
use crate::gains::valuation::{earnings_percent, ValuationProjector};
use std::sync::Arc;
use tracing::{info, instrument};

/// The external services one analysis talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub transfers: Arc<dyn TransferSource>,
    pub details: Arc<dyn TransactionDetailSource>,
    pub history: Arc<dyn PriceHistorySource>,
    pub token_info: Arc<dyn TokenInfoSource>,
    pub top_coins: Arc<dyn TopCoinsSource>,
    pub balances: Arc<dyn BalanceSource>,
}

impl Collaborators {
    /// Every role served by the same HTTP client.
    pub fn from_http(sources: Arc<HttpDataSources>) -> Self {
        Self {
            transfers: sources.clone(),
            details: sources.clone(),
            history: sources.clone(),
            token_info: sources.clone(),
            top_coins: sources.clone(),
            balances: sources,
        }
    }
}

/// Runs normalize, price, aggregate and project for a wallet/token pair.
pub struct GainsAnalyzer {
    config: GainsConfig,
    collaborators: Collaborators,
    resolver: Arc<PriceResolver>,
}

impl GainsAnalyzer {
    pub fn new(config: GainsConfig, collaborators: Collaborators, cache: Arc<dyn PriceCache>) -> Self {
        let resolver = PriceResolver::new(
            cache,
            collaborators.details.clone(),
            collaborators.history.clone(),
            &config,
        );
        Self::with_resolver(config, collaborators, Arc::new(resolver))
    }

    pub fn with_resolver(
        config: GainsConfig,
        collaborators: Collaborators,
        resolver: Arc<PriceResolver>,
    ) -> Self {
        Self {
            config,
            collaborators,
            resolver,
        }
    }

    pub fn resolver(&self) -> &Arc<PriceResolver> {
        &self.resolver
    }

    /// Analyzes `wallet`'s history in `contract` (an address or a known
    /// alias).
    ///
    /// Token info, top coins, the live balance and the transfer history are
    /// all required; losing any of them fails the run with
    /// [`GainsError::CollaboratorUnavailable`]. Individual transactions that
    /// cannot be priced only count as $0.
    #[instrument(skip(self))]
    pub async fn analyze(&self, contract: &str, wallet: &str) -> Result<AnalysisReport, GainsError> {
        let contract = self.config.resolve_contract(contract);
        let wallet = wallet.trim().to_string();

        let (record, top_coins, balance, raw_transfers) = tokio::try_join!(
            async {
                self.collaborators
                    .token_info
                    .fetch_token_snapshot(&contract)
                    .await
                    .map_err(|e| GainsError::unavailable("token info", e))
            },
            async {
                self.collaborators
                    .top_coins
                    .fetch_top_coins()
                    .await
                    .map_err(|e| GainsError::unavailable("top coins", e))
            },
            async {
                self.collaborators
                    .balances
                    .fetch_balance(&wallet, &contract)
                    .await
                    .map_err(|e| GainsError::unavailable("wallet balance", e))
            },
            async {
                self.collaborators
                    .transfers
                    .fetch_transfers(&wallet, &contract)
                    .await
                    .map_err(|e| GainsError::unavailable("transfer history", e))
            },
        )?;

        let token = TokenSnapshot::from_record(record)?;
        let mut transactions = normalize(raw_transfers, token.decimals)?;
        if transactions.is_empty() {
            return Err(GainsError::NoTransactionsFound);
        }

        let target = PriceTarget {
            contract: contract.clone(),
            symbol: token.symbol.clone(),
            decimals: token.decimals,
        };
        let unresolved_prices = self
            .resolver
            .resolve_all(&mut transactions, &target, self.config.max_parallel_resolutions)
            .await;

        let cost_basis = aggregate(&transactions, &wallet, token.decimals)?;

        let projector = ValuationProjector::new(&token);
        let live_balance = balance.amount().rescale(token.decimals);
        let (gains, balance_usd, gains_usd) = if live_balance.is_zero() {
            (
                FixedPoint::zero(token.decimals),
                FixedPoint::zero(USD_SCALE),
                FixedPoint::zero(USD_SCALE),
            )
        } else {
            let gains = projector.gains(&live_balance, &cost_basis.net_balance)?;
            let balance_usd = projector.to_usd(&live_balance);
            let gains_usd = projector.to_usd(&gains);
            (gains, balance_usd, gains_usd)
        };

        let comparison =
            projector.project_top_coin(&live_balance, &top_coins, self.config.comparison_rank)?;
        let display_suffix = DisplaySuffix::choose(
            token.decimals,
            std::iter::once(&live_balance)
                .chain(std::iter::once(&cost_basis.net_balance))
                .chain(transactions.iter().map(|t| &t.token_amount)),
        );

        info!(
            transactions = transactions.len(),
            unresolved = unresolved_prices,
            "Analyzed {} for {}: net {} live {} spent ${}",
            token.symbol,
            wallet,
            cost_basis.net_balance,
            live_balance,
            cost_basis.total_spent_usd.to_currency_string()
        );

        Ok(AnalysisReport {
            contract,
            wallet,
            market_cap_usd: projector.current_market_cap(),
            supply_share: projector.supply_share(&live_balance),
            earnings_percent: earnings_percent(&balance_usd, &cost_basis.total_spent_usd),
            token,
            transactions,
            cost_basis,
            live_balance,
            gains,
            balance_usd,
            gains_usd,
            comparison,
            top_coins,
            unresolved_prices,
            display_suffix,
        })
    }
}
