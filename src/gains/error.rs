//! Error taxonomy of the gains pipeline.

use crate::gains::fixed_point::ArithmeticError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GainsError {
    /// Divide-by-zero or scale mismatch inside a computation.
    #[error("arithmetic error: {0}")]
    Arithmetic(#[from] ArithmeticError),

    /// A single transaction could not be priced. Callers recover with zero.
    #[error("price unresolved for transaction {hash}: {reason}")]
    PriceUnresolved { hash: String, reason: String },

    #[error("No transactions found")]
    NoTransactionsFound,

    /// Token info, top coins, balances or transfer history could not be
    /// fetched. Fatal to the whole analysis.
    #[error("collaborator unavailable: {0}")]
    CollaboratorUnavailable(String),

    #[error("malformed record: {0}")]
    MalformedRecord(String),
}

impl GainsError {
    pub fn unresolved(hash: &str, reason: impl ToString) -> Self {
        GainsError::PriceUnresolved {
            hash: hash.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Wraps a collaborator failure, keeping the whole context chain.
    pub fn unavailable(what: &str, err: anyhow::Error) -> Self {
        GainsError::CollaboratorUnavailable(format!("{}: {:#}", what, err))
    }

    /// Whether a retry of the whole analysis may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GainsError::CollaboratorUnavailable(_))
    }
}
