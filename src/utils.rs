//! Fixed-point conversions between user-entered decimal text and on-chain
//! integer amounts (lamports, token base units).

use thiserror::Error;

/// Decimal places of the native coin (1 SOL = 10^9 lamports).
pub const SOL_DECIMALS: u8 = 9;

/// Fraction digits shown by [`format_balance`].
const DISPLAY_FRACTION_DIGITS: u32 = 6;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount cannot be empty")]
    Empty,
    #[error("'{0}' is not a decimal number")]
    Invalid(String),
    #[error("'{0}' is too large for this token")]
    Overflow(String),
}

/// `10^exp` as u128, or `None` when it does not fit.
pub(crate) fn pow10(exp: u32) -> Option<u128> {
    10u128.checked_pow(exp)
}

/// Split a plain decimal string into its integer and fractional digits.
///
/// Accepts `12`, `12.5`, `.5` and `12.`; rejects signs, exponents and
/// anything that is not an ASCII digit.
fn split_decimal(input: &str) -> Result<(&str, &str), AmountError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AmountError::Empty);
    }

    let (int_part, frac_part) = match trimmed.split_once('.') {
        Some((i, f)) => (i, f),
        None => (trimmed, ""),
    };

    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (int_part.is_empty() && frac_part.is_empty())
        || !all_digits(int_part)
        || !all_digits(frac_part)
    {
        return Err(AmountError::Invalid(trimmed.to_string()));
    }

    Ok((int_part, frac_part))
}

/// True when `input` is a well-formed decimal strictly greater than zero.
pub fn is_positive_decimal(input: &str) -> bool {
    match split_decimal(input) {
        Ok((int_part, frac_part)) => int_part
            .bytes()
            .chain(frac_part.bytes())
            .any(|b| b != b'0'),
        Err(_) => false,
    }
}

/// Parse decimal text into base units at `decimals` precision.
///
/// Fraction digits beyond `decimals` are dropped, so the result is the floor
/// of `amount * 10^decimals`.
pub fn parse_units(input: &str, decimals: u8) -> Result<u64, AmountError> {
    let (int_part, frac_part) = split_decimal(input)?;
    let overflow = || AmountError::Overflow(input.trim().to_string());

    let scale = pow10(decimals as u32).ok_or_else(overflow)?;

    let mut whole: u128 = 0;
    for digit in int_part.bytes() {
        whole = whole
            .checked_mul(10)
            .and_then(|w| w.checked_add((digit - b'0') as u128))
            .ok_or_else(overflow)?;
    }
    let mut units = whole.checked_mul(scale).ok_or_else(overflow)?;

    let mut place = scale;
    for digit in frac_part.bytes().take(decimals as usize) {
        place /= 10;
        units = units
            .checked_add((digit - b'0') as u128 * place)
            .ok_or_else(overflow)?;
    }

    u64::try_from(units).map_err(|_| overflow())
}

/// Convert a SOL amount string to lamports.
pub fn parse_sol_to_lamports(input: &str) -> Result<u64, AmountError> {
    parse_units(input, SOL_DECIMALS)
}

/// Render base units with every decimal place, e.g. `1.500000000`.
pub fn format_units(raw: u64, decimals: u8) -> String {
    if decimals == 0 {
        return raw.to_string();
    }
    let digits = format!("{:0>width$}", raw, width = decimals as usize + 1);
    let (int_part, frac_part) = digits.split_at(digits.len() - decimals as usize);
    format!("{}.{}", int_part, frac_part)
}

fn group_thousands(int_part: u128) -> String {
    let digits = int_part.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Short human-readable balance: `0`, `< 0.001`, or up to six fraction
/// digits with thousands separators (`1,234.5`).
pub fn format_balance(raw: u64, decimals: u8) -> String {
    if raw == 0 {
        return "0".to_string();
    }

    match pow10(decimals as u32) {
        Some(one) if (raw as u128) * 1000 >= one => {}
        _ => return "< 0.001".to_string(),
    }

    // Round half up to DISPLAY_FRACTION_DIGITS.
    let scaled: u128 = if decimals as u32 > DISPLAY_FRACTION_DIGITS {
        let divisor = pow10(decimals as u32 - DISPLAY_FRACTION_DIGITS).unwrap_or(u128::MAX);
        let q = raw as u128 / divisor;
        let r = raw as u128 % divisor;
        if r * 2 >= divisor { q + 1 } else { q }
    } else {
        raw as u128 * pow10(DISPLAY_FRACTION_DIGITS - decimals as u32).unwrap_or(1)
    };

    let unit = pow10(DISPLAY_FRACTION_DIGITS).unwrap_or(1);
    let int_part = scaled / unit;
    let frac_part = scaled % unit;

    let mut out = group_thousands(int_part);
    if frac_part > 0 {
        let frac = format!("{:0>6}", frac_part);
        out.push('.');
        out.push_str(frac.trim_end_matches('0'));
    }
    out
}
