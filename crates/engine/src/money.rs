use std::{
    collections::{BTreeMap, btree_map},
    fmt,
};

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::{CurrencyCode, EngineError, ResultEngine};

/// Balances within this distance of zero (one cent of the major unit),
/// bounds included, are treated as settled.
pub const DEBT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Largest magnitude accepted for a single amount (10^15).
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(2_764_472_320, 232_830, 0, false, 0);

pub(crate) fn amount_too_large() -> EngineError {
    EngineError::InvalidInput("amount too large".to_string())
}

/// Rejects amounts whose magnitude exceeds [`MAX_AMOUNT`].
pub(crate) fn ensure_within_limit(value: Decimal, what: &str) -> ResultEngine<()> {
    if value.abs() > MAX_AMOUNT {
        return Err(EngineError::InvalidInput(format!(
            "{what} too large: {value}"
        )));
    }
    Ok(())
}

/// Rounds to two decimals, midpoints away from zero.
///
/// Amounts are `Decimal` end to end, so there is no binary floating point
/// noise to absorb here; [`DEBT_TOLERANCE`] covers rounding residue left by
/// divisions (fees, tax bases) when comparing against zero.
///
/// ```rust
/// use engine::round2;
/// use rust_decimal::Decimal;
///
/// assert_eq!(round2(Decimal::new(1005, 3)), Decimal::new(101, 2));
/// assert_eq!(round2(Decimal::new(-1005, 3)), Decimal::new(-101, 2));
/// ```
#[must_use]
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// `true` when `|value| <= DEBT_TOLERANCE`.
#[must_use]
pub fn is_negligible(value: Decimal) -> bool {
    value.abs() <= DEBT_TOLERANCE
}

/// Parses a decimal amount typed by a user.
///
/// Accepts `.` or `,` as decimal separator and an optional leading `+`/`-`.
///
/// Validation rules:
/// - max 2 fractional digits (rejects `12.345`)
/// - rejects empty/invalid strings
///
/// ```rust
/// use engine::parse_amount;
/// use rust_decimal::Decimal;
///
/// assert_eq!(parse_amount("10,5").unwrap(), Decimal::new(1050, 2));
/// assert!(parse_amount("12.345").is_err());
/// ```
pub fn parse_amount(s: &str) -> ResultEngine<Decimal> {
    let empty = || EngineError::InvalidInput("empty amount".to_string());
    let invalid = || EngineError::InvalidInput(format!("invalid amount: {s:?}"));
    let overflow = amount_too_large;

    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(empty());
    }

    let (negative, rest) = if let Some(stripped) = trimmed.strip_prefix('-') {
        (true, stripped)
    } else if let Some(stripped) = trimmed.strip_prefix('+') {
        (false, stripped)
    } else {
        (false, trimmed)
    };

    let rest = rest.trim().replace(',', ".");
    if rest.is_empty() {
        return Err(empty());
    }

    let mut parts = rest.split('.');
    let units_str = parts.next().ok_or_else(invalid)?;
    let fraction_str = parts.next();
    if parts.next().is_some() {
        return Err(invalid());
    }

    if units_str.is_empty() || !units_str.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let units: i64 = units_str.parse().map_err(|_| overflow())?;

    let cents: i64 = match fraction_str {
        None | Some("") => 0,
        Some(frac) => {
            if !frac.chars().all(|c| c.is_ascii_digit()) {
                return Err(invalid());
            }
            match frac.len() {
                1 => frac.parse::<i64>().map_err(|_| invalid())? * 10,
                2 => frac.parse::<i64>().map_err(|_| invalid())?,
                _ => return Err(EngineError::InvalidInput("too many decimals".to_string())),
            }
        }
    };

    let total = units
        .checked_mul(100)
        .and_then(|v| v.checked_add(cents))
        .ok_or_else(overflow)?;
    let signed = if negative { -total } else { total };

    Ok(Decimal::new(signed, 2))
}

/// An amount tagged with its currency.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount: Decimal,
    pub currency: CurrencyCode,
}

impl Money {
    #[must_use]
    pub const fn new(amount: Decimal, currency: CurrencyCode) -> Self {
        Self { amount, currency }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} {}", round2(self.amount), self.currency)
    }
}

/// Per-currency amounts (`CurrencyCode -> Decimal`).
///
/// Amounts are only ever combined with amounts of the same currency: there is
/// no operation that folds two currencies together. Missing currencies read
/// as zero.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MoneyMap(BTreeMap<CurrencyCode, Decimal>);

impl MoneyMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `amount` to the `currency` bucket.
    pub fn add(&mut self, currency: CurrencyCode, amount: Decimal) {
        *self.0.entry(currency).or_default() += amount;
    }

    pub fn add_money(&mut self, money: Money) {
        self.add(money.currency, money.amount);
    }

    /// Adds every bucket of `other` into `self`.
    pub fn merge(&mut self, other: &MoneyMap) {
        for (currency, amount) in other.iter() {
            self.add(currency, amount);
        }
    }

    /// Amount in `currency` (zero when absent).
    #[must_use]
    pub fn get(&self, currency: CurrencyCode) -> Decimal {
        self.0.get(&currency).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn contains(&self, currency: CurrencyCode) -> bool {
        self.0.contains_key(&currency)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CurrencyCode, Decimal)> + '_ {
        self.0.iter().map(|(c, a)| (*c, *a))
    }

    pub fn currencies(&self) -> impl Iterator<Item = CurrencyCode> + '_ {
        self.0.keys().copied()
    }

    /// Per-currency `self - rhs` over the union of both key sets.
    #[must_use]
    pub fn minus(&self, rhs: &MoneyMap) -> MoneyMap {
        let mut out = self.clone();
        for (currency, amount) in rhs.iter() {
            out.add(currency, -amount);
        }
        out
    }

    /// Same map with every amount passed through [`round2`].
    #[must_use]
    pub fn rounded(&self) -> MoneyMap {
        MoneyMap(self.0.iter().map(|(c, a)| (*c, round2(*a))).collect())
    }

    /// Buckets strictly above the tolerance.
    #[must_use]
    pub fn outstanding(&self) -> MoneyMap {
        MoneyMap(
            self.0
                .iter()
                .filter(|(_, a)| **a > DEBT_TOLERANCE)
                .map(|(c, a)| (*c, *a))
                .collect(),
        )
    }

    /// Absolute value of the buckets below `-tolerance`.
    #[must_use]
    pub fn excess(&self) -> MoneyMap {
        MoneyMap(
            self.0
                .iter()
                .filter(|(_, a)| **a < -DEBT_TOLERANCE)
                .map(|(c, a)| (*c, round2(a.abs())))
                .collect(),
        )
    }

    /// `true` when no bucket is outside the tolerance band.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.0.values().all(|a| is_negligible(*a))
    }
}

impl FromIterator<(CurrencyCode, Decimal)> for MoneyMap {
    fn from_iter<T: IntoIterator<Item = (CurrencyCode, Decimal)>>(iter: T) -> Self {
        let mut map = MoneyMap::new();
        for (currency, amount) in iter {
            map.add(currency, amount);
        }
        map
    }
}

impl IntoIterator for MoneyMap {
    type Item = (CurrencyCode, Decimal);
    type IntoIter = btree_map::IntoIter<CurrencyCode, Decimal>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for MoneyMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("-");
        }
        let mut first = true;
        for (currency, amount) in self.iter() {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{}", Money::new(amount, currency))?;
        }
        Ok(())
    }
}
