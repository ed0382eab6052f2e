//! reflect-gains - cost basis and reflection gains for BSC tokens
//!
//! Works out what a wallet paid for a reflective token, how much the token
//! has added to the balance since, and what that balance is worth today.

pub mod types;
pub mod gains;

// Re-export main types for convenience
pub use gains::{AnalysisReport, GainsAnalyzer, GainsConfig, GainsError};
