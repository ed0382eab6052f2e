//! Core types for the gains pipeline: wire shapes delivered by the external
//! collaborators and the domain records derived from them.

use crate::gains::error::GainsError;
use crate::gains::fixed_point::{FixedPoint, TokenAmount, UsdAmount, USD_SCALE};
use crate::gains::format::DisplaySuffix;
use crate::types::{same_address, Address, TxHash};
use chrono::{DateTime, Utc};
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};

/// Extra working digits used when dividing USD by a token count, so the
/// per-token price keeps precision before it is cut back to `USD_SCALE`.
pub const COST_BASIS_EXTRA_DIGITS: u32 = 13;

/// Largest `decimals` a token may declare (`uint8` on chain).
pub const MAX_TOKEN_DECIMALS: u32 = u8::MAX as u32;

/// Rejects token decimals outside the `uint8` range so scale sums stay bounded.
pub fn check_decimals(decimals: u32) -> Result<(), GainsError> {
    if decimals > MAX_TOKEN_DECIMALS {
        return Err(GainsError::MalformedRecord(format!(
            "token decimals out of range: {}",
            decimals
        )));
    }
    Ok(())
}

// --- Wire shapes ---

/// One token transfer as reported by the transfer-history API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTransfer {
    pub hash: TxHash,
    #[serde(rename = "blockNumber", default)]
    pub block_number: String,
    /// Unix seconds, as a string.
    #[serde(rename = "timeStamp", alias = "timestamp", default)]
    pub timestamp: String,
    pub from: Address,
    pub to: Address,
    /// Integer string in the token's native scale.
    pub value: String,
    #[serde(rename = "tokenDecimal", default)]
    pub token_decimal: String,
    #[serde(rename = "tokenSymbol", default)]
    pub token_symbol: String,
}

/// Detailed transaction record with decoded log events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionDetail {
    #[serde(default)]
    pub value_quote: Option<f64>,
    #[serde(default)]
    pub from_address: Address,
    /// USD price of the native coin at transaction time.
    #[serde(default)]
    pub gas_quote_rate: Option<f64>,
    #[serde(default)]
    pub log_events: Vec<LogEvent>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogEvent {
    #[serde(default)]
    pub decoded: Option<DecodedEvent>,
    #[serde(default)]
    pub sender_address: Option<Address>,
    #[serde(default)]
    pub sender_contract_ticker_symbol: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecodedEvent {
    pub name: String,
    #[serde(default)]
    pub params: Option<Vec<EventParam>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventParam {
    #[serde(default)]
    pub value: serde_json::Value,
}

/// A decoded `Transfer(from, to, amount)` event.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferEvent<'a> {
    pub token: Option<&'a str>,
    pub ticker: Option<&'a str>,
    pub from: &'a str,
    pub to: &'a str,
    pub amount: BigInt,
}

impl LogEvent {
    /// Returns the event as a transfer when it is a decoded `Transfer` with
    /// positional `[from, to, amount]` parameters.
    pub fn as_transfer(&self) -> Option<TransferEvent<'_>> {
        let decoded = self.decoded.as_ref()?;
        if decoded.name != "Transfer" {
            return None;
        }
        let params = decoded.params.as_ref()?;
        let from = params.first()?.value.as_str()?;
        let to = params.get(1)?.value.as_str()?;
        let amount = match &params.get(2)?.value {
            serde_json::Value::String(s) => s.parse::<BigInt>().ok()?,
            serde_json::Value::Number(n) => n.to_string().parse::<BigInt>().ok()?,
            _ => return None,
        };
        Some(TransferEvent {
            token: self.sender_address.as_deref(),
            ticker: self.sender_contract_ticker_symbol.as_deref(),
            from,
            to,
            amount,
        })
    }
}

impl TransferEvent<'_> {
    /// True when the event was emitted by `contract`.
    pub fn is_token(&self, contract: &str) -> bool {
        self.token.map_or(false, |token| same_address(token, contract))
    }
}

/// Historical rate series for one symbol around one timestamp.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceHistory {
    #[serde(default)]
    pub history: Vec<HistoryPoint>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryPoint {
    #[serde(default)]
    pub rate: Option<f64>,
}

/// Token metadata as delivered by the token-info collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenSnapshotRecord {
    #[serde(default)]
    pub name: Option<String>,
    pub symbol: String,
    pub decimals: u32,
    /// Decimal string.
    pub price: String,
    /// Integer string, native scale.
    pub supply: String,
}

/// One entry of the reference "top coins by market cap" list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopCoin {
    #[serde(default)]
    pub name: Option<String>,
    pub code: String,
    #[serde(default)]
    pub cap: Option<f64>,
}

/// Live wallet balance in raw units.
#[derive(Debug, Clone, PartialEq)]
pub struct WalletBalance {
    pub raw: BigInt,
    pub decimals: u32,
}

impl WalletBalance {
    pub fn amount(&self) -> TokenAmount {
        FixedPoint::from_raw(self.raw.clone(), self.decimals)
    }
}

// --- Domain records ---

/// Current token state used for valuation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSnapshot {
    pub name: Option<String>,
    pub symbol: String,
    pub decimals: u32,
    pub current_price_usd: UsdAmount,
    pub circulating_supply: TokenAmount,
}

impl TokenSnapshot {
    /// Parses the collaborator record; the price keeps at most 18 decimals.
    pub fn from_record(record: TokenSnapshotRecord) -> Result<Self, GainsError> {
        check_decimals(record.decimals)?;
        let current_price_usd = FixedPoint::parse_with_scale(&record.price, USD_SCALE)
            .map_err(|e| GainsError::MalformedRecord(format!("token price: {}", e)))?;
        let circulating_supply = FixedPoint::parse_raw(&record.supply, record.decimals)
            .map_err(|e| GainsError::MalformedRecord(format!("token supply: {}", e)))?;
        Ok(Self {
            name: record.name,
            symbol: record.symbol,
            decimals: record.decimals,
            current_price_usd,
            circulating_supply,
        })
    }
}

/// A normalized transfer of the analyzed token into or out of the wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: TxHash,
    pub block_number: u64,
    pub timestamp: DateTime<Utc>,
    pub from: Address,
    pub to: Address,
    pub token_amount: TokenAmount,
    pub usd_value: Option<UsdAmount>,
    pub cost_basis_per_token: Option<UsdAmount>,
}

impl Transaction {
    /// True when the tokens moved into `wallet`.
    pub fn is_inflow(&self, wallet: &str) -> bool {
        same_address(&self.to, wallet)
    }

    /// Timestamp in milliseconds, the unit the price-history API expects.
    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }

    /// Records the resolved USD value and the implied price per token.
    pub fn apply_price(&mut self, usd_value: UsdAmount) {
        let usd_value = usd_value.rescale(USD_SCALE);
        self.cost_basis_per_token = usd_value
            .checked_div(&self.token_amount, USD_SCALE + COST_BASIS_EXTRA_DIGITS)
            .ok()
            .map(|basis| basis.rescale(USD_SCALE));
        self.usd_value = Some(usd_value);
    }
}

/// Aggregated holdings and spend for one wallet/token pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBasisReport {
    pub net_balance: TokenAmount,
    pub total_bought: TokenAmount,
    pub total_sold: TokenAmount,
    pub total_spent_usd: UsdAmount,
    /// `None` when the net balance is zero.
    pub average_cost_basis_per_token: Option<UsdAmount>,
    /// `None` when the cost basis is undefined or zero.
    pub tokens_per_usd: Option<TokenAmount>,
    pub transaction_count: usize,
}

/// Balance projected at the market cap of a reference coin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopCoinProjection {
    /// 1-based rank in the top coins list.
    pub rank: usize,
    pub coin: TopCoin,
    pub market_cap_usd: UsdAmount,
    pub projected_usd: UsdAmount,
}

/// Everything one analysis run produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub contract: Address,
    pub wallet: Address,
    pub token: TokenSnapshot,
    pub transactions: Vec<Transaction>,
    pub cost_basis: CostBasisReport,
    pub live_balance: TokenAmount,
    /// Live balance minus net bought: what reflection added.
    pub gains: TokenAmount,
    pub balance_usd: UsdAmount,
    pub gains_usd: UsdAmount,
    pub market_cap_usd: UsdAmount,
    /// Share of circulating supply in per-ten-thousand.
    pub supply_share: Option<FixedPoint>,
    pub earnings_percent: Option<FixedPoint>,
    pub comparison: Option<TopCoinProjection>,
    pub top_coins: Vec<TopCoin>,
    /// Transactions whose price could not be resolved and count as zero.
    pub unresolved_prices: usize,
    pub display_suffix: DisplaySuffix,
}
