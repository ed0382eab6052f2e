//! Transfer log normalization.
//!
//! The transfer-history API occasionally reports one transaction as several
//! consecutive records. Adjacent records with the same hash are folded into
//! the earlier one by summing their values. Records sharing a hash that are
//! not adjacent are left alone, and the delivered order is never changed.

use crate::gains::error::GainsError;
use crate::gains::fixed_point::FixedPoint;
use crate::gains::types::{RawTransfer, Transaction};
use chrono::DateTime;
use num_bigint::BigInt;
use tracing::debug;

/// Folds every run of adjacent same-hash records into its first record.
pub fn merge_adjacent_duplicates(
    mut records: Vec<RawTransfer>,
) -> Result<Vec<RawTransfer>, GainsError> {
    // Walk from the end so a run of three or more collapses completely.
    let mut x = records.len();
    while x > 1 {
        x -= 1;
        if records[x].hash != records[x - 1].hash {
            continue;
        }
        let later = records.remove(x);
        let earlier = &mut records[x - 1];
        let sum = parse_value(&earlier.value, &earlier.hash)? + parse_value(&later.value, &later.hash)?;
        debug!(hash = %earlier.hash, "merged duplicate transfer record");
        earlier.value = sum.to_string();
    }
    Ok(records)
}

/// Merges duplicates and converts the raw records into transactions whose
/// amounts carry `decimals` as scale.
pub fn normalize(records: Vec<RawTransfer>, decimals: u32) -> Result<Vec<Transaction>, GainsError> {
    merge_adjacent_duplicates(records)?
        .into_iter()
        .map(|record| to_transaction(record, decimals))
        .collect()
}

fn to_transaction(record: RawTransfer, decimals: u32) -> Result<Transaction, GainsError> {
    let malformed = |field: &str| {
        GainsError::MalformedRecord(format!("transfer {}: bad {}", record.hash, field))
    };

    let block_number = if record.block_number.trim().is_empty() {
        0
    } else {
        record
            .block_number
            .trim()
            .parse::<u64>()
            .map_err(|_| malformed("blockNumber"))?
    };
    let seconds = record
        .timestamp
        .trim()
        .parse::<i64>()
        .map_err(|_| malformed("timeStamp"))?;
    let timestamp = DateTime::from_timestamp(seconds, 0).ok_or_else(|| malformed("timeStamp"))?;
    let token_amount = FixedPoint::from_raw(parse_value(&record.value, &record.hash)?, decimals);

    Ok(Transaction {
        hash: record.hash,
        block_number,
        timestamp,
        from: record.from,
        to: record.to,
        token_amount,
        usd_value: None,
        cost_basis_per_token: None,
    })
}

fn parse_value(value: &str, hash: &str) -> Result<BigInt, GainsError> {
    value
        .trim()
        .parse::<BigInt>()
        .map_err(|_| GainsError::MalformedRecord(format!("transfer {}: bad value {:?}", hash, value)))
}
