//! # Amount Serializer
//!
//! Converts between the human-decimal strings people type ("0.5", "100")
//! and the raw fixed-point `u64` units the ledger and the coprocessor work in.
//!
//! Every amount in Shroud is an unsigned 64-bit integer with six implied
//! fractional digits. Nothing in the protocol divides or rounds; precision
//! beyond six digits is truncated at the parsing boundary and never reaches
//! encryption.
//!
//! Three entry points:
//!
//! - [`parse_amount`]: strict, used at submission time.
//! - [`format_amount`]: the inverse; `parse_amount(&format_amount(a)) == a`.
//! - [`sanitize_input`]: lenient, used while a value is still being typed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::TOKEN_DECIMALS;

/// Largest precision the serializer supports. `10^18 * u64::MAX` still fits
/// in a `u128`, which keeps every intermediate product exact.
pub const MAX_SUPPORTED_DECIMALS: u32 = 18;

/// `u64::MAX` rendered with [`TOKEN_DECIMALS`] fractional digits.
pub const MAX_DISPLAY_AMOUNT: &str = "18446744073709.551615";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Reasons a decimal string cannot become an [`Amount`].
///
/// All variants surface as the `OutOfRange` kind on the protocol boundary;
/// the detail is kept for logs and for form validation messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,

    #[error("amount must not be negative")]
    Negative,

    #[error("invalid character {0:?} in amount")]
    InvalidCharacter(char),

    #[error("amount contains more than one decimal point")]
    MultipleDecimalPoints,

    #[error("amount has no digits")]
    NoDigits,

    #[error("amount exceeds the 64-bit range (max {MAX_DISPLAY_AMOUNT})")]
    OutOfRange,

    #[error("amount must be greater than zero")]
    Zero,

    #[error("unsupported precision: {0} decimals (max {MAX_SUPPORTED_DECIMALS})")]
    UnsupportedPrecision(u32),
}

// ---------------------------------------------------------------------------
// Amount
// ---------------------------------------------------------------------------

/// A token amount in raw units (one unit = 10^-6 cETH).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    /// Zero units.
    pub const ZERO: Amount = Amount(0);

    /// The largest representable amount.
    pub const MAX: Amount = Amount(u64::MAX);

    /// Wraps a raw unit count.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw unit count.
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Returns `true` for zero units.
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Checked addition. `None` on overflow.
    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    /// Checked subtraction. `None` on underflow.
    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }
}

impl From<u64> for Amount {
    fn from(raw: u64) -> Self {
        Amount(raw)
    }
}

impl From<Amount> for u64 {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_amount(*self))
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_amount(s)
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parses a decimal string with the token's six fractional digits.
///
/// Digits beyond the sixth are truncated, never rounded:
/// `"0.1000005"` becomes `100000` units.
///
/// # Errors
///
/// Empty input, a leading `-`, stray characters, a second decimal point, or a
/// value above `u64::MAX` units.
pub fn parse_amount(text: &str) -> Result<Amount, AmountError> {
    parse_amount_with(text, TOKEN_DECIMALS)
}

/// Like [`parse_amount`] but additionally rejects zero. Faucet requests and
/// distribution rows must move a positive amount.
pub fn parse_positive_amount(text: &str) -> Result<Amount, AmountError> {
    let amount = parse_amount(text)?;
    if amount.is_zero() {
        return Err(AmountError::Zero);
    }
    Ok(amount)
}

/// Parses a decimal string into raw units with `decimals` fractional digits.
pub fn parse_amount_with(text: &str, decimals: u32) -> Result<Amount, AmountError> {
    if decimals > MAX_SUPPORTED_DECIMALS {
        return Err(AmountError::UnsupportedPrecision(decimals));
    }

    let text = text.trim();
    if text.is_empty() {
        return Err(AmountError::Empty);
    }
    if text.starts_with('-') {
        return Err(AmountError::Negative);
    }

    let (whole, fraction) = match text.split_once('.') {
        Some((w, f)) => (w, f),
        None => (text, ""),
    };
    if fraction.contains('.') {
        return Err(AmountError::MultipleDecimalPoints);
    }
    if whole.is_empty() && fraction.is_empty() {
        return Err(AmountError::NoDigits);
    }
    if let Some(bad) = whole.chars().chain(fraction.chars()).find(|c| !c.is_ascii_digit()) {
        return Err(AmountError::InvalidCharacter(bad));
    }

    // ASCII digits only from here on, so byte slicing is safe.
    let kept = &fraction[..fraction.len().min(decimals as usize)];

    let scale = 10u128.pow(decimals);
    let whole_units = digits_to_u128(whole)?
        .checked_mul(scale)
        .ok_or(AmountError::OutOfRange)?;
    let fraction_units = digits_to_u128(kept)? * 10u128.pow(decimals - kept.len() as u32);

    let total = whole_units
        .checked_add(fraction_units)
        .ok_or(AmountError::OutOfRange)?;

    u64::try_from(total)
        .map(Amount)
        .map_err(|_| AmountError::OutOfRange)
}

/// Accumulates ASCII digits into a `u128`, bailing out on overflow instead
/// of wrapping. Leading zeros are fine.
fn digits_to_u128(digits: &str) -> Result<u128, AmountError> {
    digits.bytes().try_fold(0u128, |acc, b| {
        acc.checked_mul(10)
            .and_then(|v| v.checked_add(u128::from(b - b'0')))
            .ok_or(AmountError::OutOfRange)
    })
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

/// Formats raw units as a minimal decimal string: trailing fractional zeros
/// are dropped and whole numbers carry no decimal point.
pub fn format_amount(amount: Amount) -> String {
    format_amount_with(amount, TOKEN_DECIMALS)
}

/// Minimal decimal rendering with `decimals` fractional digits.
pub fn format_amount_with(amount: Amount, decimals: u32) -> String {
    let fixed = format_fixed_with(amount, decimals);
    if !fixed.contains('.') {
        return fixed;
    }
    let trimmed = fixed.trim_end_matches('0');
    trimmed.trim_end_matches('.').to_string()
}

/// Formats raw units with exactly six fractional digits (`"0.100000"`).
pub fn format_fixed(amount: Amount) -> String {
    format_fixed_with(amount, TOKEN_DECIMALS)
}

/// Fixed-width rendering with exactly `decimals` fractional digits.
pub fn format_fixed_with(amount: Amount, decimals: u32) -> String {
    let decimals = decimals.min(MAX_SUPPORTED_DECIMALS);
    if decimals == 0 {
        return amount.0.to_string();
    }
    let scale = 10u128.pow(decimals);
    let raw = u128::from(amount.0);
    format!(
        "{}.{:0width$}",
        raw / scale,
        raw % scale,
        width = decimals as usize
    )
}

// ---------------------------------------------------------------------------
// Interactive input
// ---------------------------------------------------------------------------

/// Cleans a partially typed amount without ever rejecting it.
///
/// Keeps digits and the first decimal point, drops everything else,
/// truncates the fraction to six digits, and keeps a trailing `.` so the
/// user can keep typing. Whether the result is a valid amount is decided
/// later by [`parse_amount`].
pub fn sanitize_input(value: &str) -> String {
    sanitize_input_with(value, TOKEN_DECIMALS)
}

/// [`sanitize_input`] with a custom precision.
pub fn sanitize_input_with(value: &str, decimals: u32) -> String {
    let mut cleaned = String::with_capacity(value.len());
    let mut dot_seen = false;
    for c in value.chars() {
        if c.is_ascii_digit() {
            cleaned.push(c);
        } else if c == '.' && !dot_seen {
            dot_seen = true;
            cleaned.push('.');
        }
    }

    if cleaned.is_empty() {
        return String::new();
    }
    if !dot_seen {
        return cleaned;
    }

    let (whole_raw, fraction_raw) = cleaned.split_once('.').unwrap_or((&cleaned, ""));
    let whole = if whole_raw.is_empty() { "0" } else { whole_raw };
    let fraction = &fraction_raw[..fraction_raw.len().min(decimals as usize)];

    if value.ends_with('.') && fraction_raw.is_empty() {
        return format!("{}.", whole);
    }
    if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, fraction)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
