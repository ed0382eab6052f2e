//! Gains module - price resolution and cost basis for reflective tokens
//!
//! Normalizes a wallet's transfer history, prices every transaction through
//! a cached tier chain, aggregates the cost basis and projects the live
//! balance onto current and hypothetical market caps.

pub mod fixed_point;
pub mod format;
pub mod error;
pub mod types;
pub mod config;
pub mod normalizer;
pub mod price_cache;
pub mod price_resolver;
pub mod aggregator;
pub mod valuation;
pub mod collaborators;
pub mod data_sources;
pub mod analysis;

// Re-export main types
pub use fixed_point::{ArithmeticError, FixedPoint, TokenAmount, UsdAmount, USD_SCALE};
pub use error::GainsError;
pub use types::{
    AnalysisReport, CostBasisReport, RawTransfer, TokenSnapshot, TopCoin, TopCoinProjection,
    Transaction, TransactionDetail,
};
pub use config::{BalanceMode, GainsConfig};

// Re-export key components
pub use normalizer::normalize;
pub use price_cache::{MemoryPriceCache, PriceCache, SqlitePriceCache};
pub use price_resolver::{PriceResolver, PriceTarget, PriceTier};
pub use aggregator::aggregate;
pub use valuation::ValuationProjector;
pub use data_sources::HttpDataSources;
pub use analysis::{Collaborators, GainsAnalyzer};
