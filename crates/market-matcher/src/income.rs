//! Sale income per period
//!
//! Basis is quoted as cash minus futures in cents with a contract month
//! suffix (`"-53K"`, `"25Z"`). October sales are valued at the futures-adjusted
//! price `price - basis / 100`.

use crate::{DestinationPoint, MatcherError, PeriodKind, Result};

/// Number of leading characters of a basis quote that carry the value
const BASIS_PREFIX_CHARS: usize = 3;

/// Parse a basis quote into dollars.
///
/// Reads the longest signed decimal prefix of the first three characters:
/// `"-53K"` → -0.53, `"53K"` → 0.53, `"0 Z"` → 0.0. The window is taken
/// before whitespace is trimmed, so `" -53K"` reads as `"-5"`.
pub fn parse_basis(raw: &str) -> Result<f64> {
    let window: String = raw.chars().take(BASIS_PREFIX_CHARS).collect();
    let head = window.trim();

    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    for (i, c) in head.char_indices() {
        match c {
            '-' | '+' if i == 0 => {}
            '.' if !seen_dot => seen_dot = true,
            d if d.is_ascii_digit() => seen_digit = true,
            _ => break,
        }
        end = i + c.len_utf8();
    }

    if !seen_digit {
        return Err(MatcherError::InvalidBasis(raw.to_string()));
    }

    head[..end]
        .parse::<f64>()
        .map(|cents| cents / 100.0)
        .map_err(|_| MatcherError::InvalidBasis(raw.to_string()))
}

/// A destination's complete price data for one period
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub price: f64,
    /// Basis as quoted, carried through to the output
    pub basis: String,
    /// Parsed basis in dollars; zero when the period ignores basis
    basis_dollars: f64,
}

impl Quote {
    /// Build a quote, parsing the basis only when the period prices with it
    pub fn new(price: f64, basis: impl Into<String>, period: PeriodKind) -> Result<Self> {
        let basis = basis.into();
        let basis_dollars = if period.uses_basis() {
            parse_basis(&basis)?
        } else {
            0.0
        };
        Ok(Self {
            price,
            basis,
            basis_dollars,
        })
    }

    /// Quote for `period`, or `None` when price or basis is missing
    pub fn for_destination(destination: &DestinationPoint, period: PeriodKind) -> Option<Result<Self>> {
        let price = destination.price(period)?;
        let basis = destination.basis(period)?;
        Some(Self::new(price, basis, period))
    }

    /// Unit sale price for the period
    pub fn sale_price(&self, period: PeriodKind) -> f64 {
        match period {
            PeriodKind::April => self.price,
            PeriodKind::October => self.price - self.basis_dollars,
        }
    }
}

/// Gross sale income for the period share of an origin's annual volume
pub fn income(quote: &Quote, volume_bu: f64, period: PeriodKind) -> f64 {
    (volume_bu * period.share()) * quote.sale_price(period)
}
