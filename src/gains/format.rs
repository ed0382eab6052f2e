//! Pure string formatting for amounts shown to the user.
//!
//! Every function here truncates; nothing rounds.

use crate::gains::fixed_point::{ArithmeticError, FixedPoint, TokenAmount};
use num_bigint::BigInt;

/// Groups the integer digits with thousands separators, keeping a leading
/// minus sign in front.
pub fn commify(integer: &str) -> String {
    let (sign, digits) = match integer.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", integer),
    };

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("{}{}", sign, grouped)
}

/// Formats a numeric string as a fixed two-decimal number with grouped
/// thousands. `1234.5678` becomes `1,234.56`, `5` becomes `5.00`.
pub fn format_currency(value: &str) -> String {
    let (int_part, frac_part) = value.split_once('.').unwrap_or((value, ""));
    let mut cents: String = frac_part.chars().take(2).collect();
    while cents.len() < 2 {
        cents.push('0');
    }

    // "-0.00" after truncation is just zero.
    let int_part = match int_part.strip_prefix('-') {
        Some(rest) if rest.chars().all(|c| c == '0') && cents == "00" => rest,
        _ => int_part,
    };
    let int_part = if int_part.is_empty() || int_part == "-" {
        format!("{}0", int_part)
    } else {
        int_part.to_string()
    };

    format!("{}.{}", commify(&int_part), cents)
}

/// Parses a string produced by [`format_currency`] (or any plain decimal,
/// with optional `$` and separators) back into a value.
pub fn parse_currency(value: &str) -> Result<FixedPoint, ArithmeticError> {
    let cleaned: String = value
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',')
        .collect();
    cleaned.parse()
}

/// Magnitude suffix used to keep very large token counts readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum DisplaySuffix {
    None,
    Thousands,
    Millions,
}

impl DisplaySuffix {
    pub fn divisor(&self) -> u64 {
        match self {
            DisplaySuffix::None => 1,
            DisplaySuffix::Thousands => 1_000,
            DisplaySuffix::Millions => 1_000_000,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DisplaySuffix::None => "",
            DisplaySuffix::Thousands => "K",
            DisplaySuffix::Millions => "M",
        }
    }

    /// Picks a suffix from the shortest raw amount that will be displayed:
    /// more than six whole digits gives `M`, more than three gives `K`.
    pub fn choose<'a>(decimals: u32, amounts: impl IntoIterator<Item = &'a TokenAmount>) -> Self {
        let shortest = amounts.into_iter().map(|a| a.raw_len()).min();
        let whole_digits = match shortest {
            Some(len) => len as i64 - decimals as i64,
            None => 0,
        };
        if whole_digits > 6 {
            DisplaySuffix::Millions
        } else if whole_digits > 3 {
            DisplaySuffix::Thousands
        } else {
            DisplaySuffix::None
        }
    }
}

/// Formats a token amount for display. With a suffix only the integer part
/// is shown (`12,345K`); without one, two truncated decimals (`1,234.56`).
pub fn format_token_amount(amount: &TokenAmount, suffix: DisplaySuffix) -> String {
    let divided = FixedPoint::from_raw(
        amount.mantissa() / BigInt::from(suffix.divisor()),
        amount.scale(),
    );
    let text = format_currency(&divided.to_string());
    match suffix {
        DisplaySuffix::None => text,
        _ => {
            let whole = text.split('.').next().unwrap_or("0");
            format!("{}{}", whole, suffix.label())
        }
    }
}
