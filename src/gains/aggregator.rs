//! Cost basis aggregation over a priced transaction list.

use crate::gains::error::GainsError;
use crate::gains::fixed_point::{FixedPoint, USD_SCALE};
use crate::gains::types::{check_decimals, CostBasisReport, Transaction, COST_BASIS_EXTRA_DIGITS};
use tracing::debug;

/// Folds `transactions` in list order into a [`CostBasisReport`].
///
/// A transaction whose `to` matches `wallet` is an inflow: it adds to the
/// net balance and to the bought total, and its USD value counts as spend.
/// Anything else is an outflow and works the other way round. Unpriced
/// transactions count as $0.
pub fn aggregate(
    transactions: &[Transaction],
    wallet: &str,
    decimals: u32,
) -> Result<CostBasisReport, GainsError> {
    if transactions.is_empty() {
        return Err(GainsError::NoTransactionsFound);
    }
    check_decimals(decimals)?;

    let mut net_balance = FixedPoint::zero(decimals);
    let mut total_bought = FixedPoint::zero(decimals);
    let mut total_sold = FixedPoint::zero(decimals);
    let mut total_spent_usd = FixedPoint::zero(USD_SCALE);

    for txn in transactions {
        let amount = txn.token_amount.rescale(decimals);
        let usd = txn
            .usd_value
            .as_ref()
            .map(|v| v.rescale(USD_SCALE))
            .unwrap_or_else(|| FixedPoint::zero(USD_SCALE));

        if txn.is_inflow(wallet) {
            net_balance = net_balance.checked_add(&amount)?;
            total_bought = total_bought.checked_add(&amount)?;
            total_spent_usd = total_spent_usd.checked_add(&usd)?;
        } else {
            net_balance = net_balance.checked_sub(&amount)?;
            total_sold = total_sold.checked_add(&amount)?;
            total_spent_usd = total_spent_usd.checked_sub(&usd)?;
        }
    }

    let average_cost_basis_per_token = if net_balance.is_zero() {
        None
    } else {
        Some(
            total_spent_usd
                .checked_div(&net_balance, USD_SCALE + COST_BASIS_EXTRA_DIGITS)?
                .rescale(USD_SCALE),
        )
    };

    let tokens_per_usd = match &average_cost_basis_per_token {
        Some(basis) if !basis.is_zero() => {
            Some(FixedPoint::one(USD_SCALE).checked_div(basis, decimals)?)
        }
        _ => None,
    };

    debug!(
        count = transactions.len(),
        "net {} bought {} sold {} spent {}",
        net_balance,
        total_bought,
        total_sold,
        total_spent_usd
    );

    Ok(CostBasisReport {
        net_balance,
        total_bought,
        total_sold,
        total_spent_usd,
        average_cost_basis_per_token,
        tokens_per_usd,
        transaction_count: transactions.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;

    const WALLET: &str = "0xWallet";

    fn txn(hash: &str, from: &str, to: &str, tokens: &str, usd: Option<&str>) -> Transaction {
        let mut txn = Transaction {
            hash: hash.into(),
            block_number: 1,
            timestamp: DateTime::from_timestamp(1_620_000_000, 0).unwrap(),
            from: from.into(),
            to: to.into(),
            token_amount: FixedPoint::parse_with_scale(tokens, 18).unwrap(),
            usd_value: None,
            cost_basis_per_token: None,
        };
        if let Some(usd) = usd {
            txn.apply_price(usd.parse().unwrap());
        }
        txn
    }

    #[test]
    fn test_buy_then_sell() {
        let report = aggregate(
            &[
                txn("a", "0xpool", "0xwallet", "100", None),
                txn("b", "0xwallet", "0xother", "40", None),
            ],
            WALLET,
            18,
        )
        .unwrap();
        assert_eq!(report.net_balance.to_string(), "60.0");
        assert_eq!(report.total_bought.to_string(), "100.0");
        assert_eq!(report.total_sold.to_string(), "40.0");
        assert!(report.total_spent_usd.is_zero());
        assert_eq!(report.transaction_count, 2);
    }

    #[test]
    fn test_average_cost_basis() {
        let report = aggregate(
            &[
                txn("a", "0xpool", WALLET, "1000", Some("10")),
                txn("b", "0xpool", WALLET, "2000", Some("40")),
            ],
            WALLET,
            18,
        )
        .unwrap();
        assert_eq!(report.net_balance.to_string(), "3000.0");
        assert_eq!(report.total_spent_usd.to_currency_string(), "50.00");
        let basis = report.average_cost_basis_per_token.unwrap();
        assert_eq!(basis.to_string(), "0.016666666666666666");
        assert_eq!(basis.to_currency_string(), "0.01");
        assert_eq!(report.tokens_per_usd.unwrap().to_string(), "60.0000000000000024");
    }

    #[test]
    fn test_sale_reduces_spend() {
        let report = aggregate(
            &[
                txn("a", "0xpool", WALLET, "100", Some("50")),
                txn("b", WALLET, "0xpool", "50", Some("30")),
            ],
            WALLET,
            18,
        )
        .unwrap();
        assert_eq!(report.total_spent_usd.to_string(), "20.0");
        assert_eq!(report.average_cost_basis_per_token.unwrap().to_string(), "0.4");
    }

    #[test]
    fn test_zero_net_balance_leaves_basis_undefined() {
        let report = aggregate(
            &[
                txn("a", "0xpool", WALLET, "10", Some("5")),
                txn("b", WALLET, "0xpool", "10", Some("7")),
            ],
            WALLET,
            18,
        )
        .unwrap();
        assert!(report.net_balance.is_zero());
        assert!(report.average_cost_basis_per_token.is_none());
        assert!(report.tokens_per_usd.is_none());
    }

    #[test]
    fn test_free_tokens_have_no_tokens_per_usd() {
        let report = aggregate(&[txn("a", "0xairdrop", WALLET, "10", Some("0"))], WALLET, 18).unwrap();
        assert!(report.average_cost_basis_per_token.unwrap().is_zero());
        assert!(report.tokens_per_usd.is_none());
    }

    #[test]
    fn test_empty_list_is_reported() {
        let err = aggregate(&[], WALLET, 18).unwrap_err();
        assert!(matches!(err, GainsError::NoTransactionsFound));
        assert_eq!(err.to_string(), "No transactions found");
    }

    #[test]
    fn test_oversized_decimals_are_rejected() {
        let mut huge = txn("a", "0xpool", "0xwallet", "1", None);
        huge.token_amount = FixedPoint::from_raw(1, u32::MAX - 5);
        let err = aggregate(&[huge], WALLET, u32::MAX - 5).unwrap_err();
        assert!(matches!(err, GainsError::MalformedRecord(_)));
    }
}
