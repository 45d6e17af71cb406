//! # Record Payloads
//!
//! Typed fields of one dataset row. Prices are fixed-point decimals with
//! eight fractional digits, parsed straight from decimal text so that
//! `171.8`, `171.80` and `+171.800` are the same value. Binary floating point
//! never touches a value that is hashed.

use crate::canonicalize::commitment_for;
use crate::models::{Commitment, Identity};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of fractional decimal digits carried by a [`Price`].
pub const PRICE_DECIMALS: u32 = 8;

/// Units per whole price (`10^PRICE_DECIMALS`).
pub const PRICE_SCALE: i64 = 100_000_000;

/// Reasons a textual field cannot become a typed value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    /// The field is empty.
    #[error("empty value")]
    Empty,

    /// The field contains something other than digits, one sign and one point.
    #[error("not a decimal number: {0:?}")]
    NotANumber(String),

    /// More fractional digits than the fixed-point scale can hold.
    #[error("{value:?} has more than {max} fractional digits")]
    ExcessPrecision {
        /// The offending text.
        value: String,
        /// Maximum number of fractional digits.
        max: u32,
    },

    /// The value does not fit the target integer.
    #[error("{0:?} is out of range")]
    Overflow(String),

    /// A negative value where only non-negative ones are allowed.
    #[error("{0:?} is negative")]
    Negative(String),
}

/// A fixed-point decimal price in units of `10^-8`.
///
/// # Example
///
/// ```rust
/// use poh_registry::Price;
///
/// let a: Price = "171.8".parse().unwrap();
/// let b: Price = "171.80".parse().unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.units(), 17_180_000_000);
/// assert_eq!(a.to_string(), "171.8");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(i64);

impl Price {
    /// Builds a price from raw `10^-8` units.
    pub const fn from_units(units: i64) -> Self {
        Price(units)
    }

    /// Raw `10^-8` units.
    pub const fn units(&self) -> i64 {
        self.0
    }

    /// True for prices below zero.
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

impl FromStr for Price {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, ValueError> {
        let text = s.trim();
        if text.is_empty() {
            return Err(ValueError::Empty);
        }

        let (negative, unsigned) = match text.as_bytes()[0] {
            b'-' => (true, &text[1..]),
            b'+' => (false, &text[1..]),
            _ => (false, text),
        };

        let (whole, frac) = unsigned.split_once('.').unwrap_or((unsigned, ""));
        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if (whole.is_empty() && frac.is_empty()) || !all_digits(whole) || !all_digits(frac) {
            return Err(ValueError::NotANumber(s.to_string()));
        }

        let frac = frac.trim_end_matches('0');
        if frac.len() > PRICE_DECIMALS as usize {
            return Err(ValueError::ExcessPrecision {
                value: s.to_string(),
                max: PRICE_DECIMALS,
            });
        }

        let overflow = || ValueError::Overflow(s.to_string());
        let whole_units: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| overflow())?
        };
        let frac_units: i64 = if frac.is_empty() {
            0
        } else {
            let digits: i64 = frac.parse().map_err(|_| overflow())?;
            digits * 10_i64.pow(PRICE_DECIMALS - frac.len() as u32)
        };

        let units = whole_units
            .checked_mul(PRICE_SCALE)
            .and_then(|w| w.checked_add(frac_units))
            .ok_or_else(overflow)?;

        Ok(Price(if negative { -units } else { units }))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let scale = PRICE_SCALE as u64;
        let whole = abs / scale;
        let frac = abs % scale;
        if frac == 0 {
            return write!(f, "{}{}", sign, whole);
        }
        let digits = format!("{:08}", frac);
        write!(f, "{}{}.{}", sign, whole, digits.trim_end_matches('0'))
    }
}

/// Parses a share volume.
///
/// Accepts plain integers and integers with an all-zero fractional part
/// (`57157115.0`), which spreadsheet exports commonly produce.
pub fn parse_volume(s: &str) -> Result<u64, ValueError> {
    let text = s.trim();
    if text.is_empty() {
        return Err(ValueError::Empty);
    }
    if text.starts_with('-') {
        return Err(ValueError::Negative(s.to_string()));
    }
    let unsigned = text.strip_prefix('+').unwrap_or(text);
    let (whole, frac) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    if whole.is_empty()
        || !whole.bytes().all(|b| b.is_ascii_digit())
        || !frac.bytes().all(|b| b == b'0')
    {
        return Err(ValueError::NotANumber(s.to_string()));
    }
    whole.parse().map_err(|_| ValueError::Overflow(s.to_string()))
}

/// The typed fields of one record, in canonical order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPayload {
    /// Opening price.
    pub open: Price,
    /// Session high.
    pub high: Price,
    /// Session low.
    pub low: Price,
    /// Closing price.
    pub close: Price,
    /// Traded volume.
    pub volume: u64,
}

/// One historical record: its identity plus the payload it names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Registry key of the record.
    pub identity: Identity,
    /// Fields covered by the commitment.
    pub payload: RecordPayload,
}

impl Record {
    /// The commitment of this record under the canonical encoding.
    pub fn commitment(&self) -> Commitment {
        commitment_for(self)
    }
}
