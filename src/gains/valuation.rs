//! Valuation of token amounts at the current price, and projections of a
//! balance onto other market caps.

use crate::gains::error::GainsError;
use crate::gains::fixed_point::{FixedPoint, TokenAmount, UsdAmount, USD_SCALE};
use crate::gains::types::{TokenSnapshot, TopCoin, TopCoinProjection};

/// Scale of the supply-share ratio before it is read as per-ten-thousand
/// with three decimals.
const SUPPLY_SHARE_RATIO_SCALE: u32 = 7;
const SUPPLY_SHARE_SCALE: u32 = 3;

const EARNINGS_RATIO_SCALE: u32 = 4;
const EARNINGS_PERCENT_SCALE: u32 = 2;

/// Pure projections over one [`TokenSnapshot`].
#[derive(Debug, Clone)]
pub struct ValuationProjector {
    price: UsdAmount,
    supply: TokenAmount,
    decimals: u32,
}

impl ValuationProjector {
    pub fn new(snapshot: &TokenSnapshot) -> Self {
        Self {
            price: snapshot.current_price_usd.rescale(USD_SCALE),
            supply: snapshot.circulating_supply.rescale(snapshot.decimals),
            decimals: snapshot.decimals,
        }
    }

    pub fn price(&self) -> &UsdAmount {
        &self.price
    }

    /// `amount × current price`, truncated to USD precision.
    pub fn to_usd(&self, amount: &TokenAmount) -> UsdAmount {
        (amount * &self.price).rescale(USD_SCALE)
    }

    /// Circulating supply valued at the current price.
    pub fn current_market_cap(&self) -> UsdAmount {
        self.to_usd(&self.supply)
    }

    /// USD value `balance` would have if the token's market cap were
    /// `hypothetical_cap`. A zero current cap divides by one dollar instead.
    pub fn scale_to_market_cap(
        &self,
        balance: &TokenAmount,
        hypothetical_cap: &UsdAmount,
    ) -> Result<UsdAmount, GainsError> {
        let current = self.current_market_cap();
        let divisor = if current.is_zero() {
            FixedPoint::one(USD_SCALE)
        } else {
            current
        };
        let ratio = hypothetical_cap.checked_div(&divisor, USD_SCALE + self.decimals)?;
        let scaled = (balance * &ratio).rescale(self.decimals);
        Ok(self.to_usd(&scaled))
    }

    /// Share of circulating supply held, in per-ten-thousand with three
    /// decimals. `None` when the supply is zero.
    pub fn supply_share(&self, balance: &TokenAmount) -> Option<FixedPoint> {
        let ratio = balance
            .checked_div(&self.supply, SUPPLY_SHARE_RATIO_SCALE)
            .ok()?;
        Some(FixedPoint::from_raw(ratio.mantissa().clone(), SUPPLY_SHARE_SCALE))
    }

    /// Reflection gains: what the wallet holds beyond what it bought.
    pub fn gains(&self, live_balance: &TokenAmount, net_balance: &TokenAmount) -> Result<TokenAmount, GainsError> {
        Ok(live_balance
            .rescale(self.decimals)
            .checked_sub(&net_balance.rescale(self.decimals))?)
    }

    /// Projects `balance` onto the market cap of the coin at 1-based `rank`.
    /// `None` when the list is too short or the coin has no cap.
    pub fn project_top_coin(
        &self,
        balance: &TokenAmount,
        coins: &[TopCoin],
        rank: usize,
    ) -> Result<Option<TopCoinProjection>, GainsError> {
        let Some(coin) = rank.checked_sub(1).and_then(|index| coins.get(index)) else {
            return Ok(None);
        };
        let Some(cap) = coin.cap else {
            return Ok(None);
        };
        let market_cap_usd = FixedPoint::from_f64(cap, USD_SCALE)?;
        let projected_usd = self.scale_to_market_cap(balance, &market_cap_usd)?;
        Ok(Some(TopCoinProjection {
            rank,
            coin: coin.clone(),
            market_cap_usd,
            projected_usd,
        }))
    }
}

/// `(balance − spent) / spent × 100` with two decimals. `None` when nothing
/// was spent.
pub fn earnings_percent(balance_usd: &UsdAmount, spent_usd: &UsdAmount) -> Option<FixedPoint> {
    let spent = spent_usd.rescale(USD_SCALE);
    let diff = balance_usd.rescale(USD_SCALE).checked_sub(&spent).ok()?;
    let ratio = diff.checked_div(&spent, EARNINGS_RATIO_SCALE).ok()?;
    Some(FixedPoint::from_raw(ratio.mantissa().clone(), EARNINGS_PERCENT_SCALE))
}
