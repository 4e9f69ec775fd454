//! Payment lines and financing fees.
//!
//! A receipt carries one or more [`PaymentLine`]s. Before anything else looks
//! at them they go through [`normalize_payment_lines`], which canonicalizes
//! the currency, validates the line and derives the financing fee. The same
//! function backs the live preview in forms and the authoritative amounts the
//! store persists, so both sides always agree on the fee.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    CurrencyCode, EngineError, MoneyMap, ResultEngine, canonicalize,
    money::{amount_too_large, ensure_within_limit},
    round2,
};

/// Percent fee values above this are rejected as probable typos.
pub const MAX_FEE_PERCENT: Decimal = Decimal::from_parts(1000, 0, 0, false, 0);

/// How the financing fee of a payment line is computed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeMode {
    #[default]
    None,
    Fixed,
    Percent,
}

impl FeeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Fixed => "fixed",
            Self::Percent => "percent",
        }
    }
}

impl TryFrom<&str> for FeeMode {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "fixed" => Ok(Self::Fixed),
            "percent" | "%" => Ok(Self::Percent),
            other => Err(EngineError::InvalidInput(format!(
                "invalid fee mode: {other}"
            ))),
        }
    }
}

/// Payment method referenced by a line.
///
/// `operator_credit` marks instruments that consume a credit balance held
/// with a tour operator instead of moving money through an agency account.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: i64,
    #[serde(default)]
    pub operator_credit: bool,
}

/// A payment line as submitted with a receipt.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaymentLine {
    pub amount: Decimal,
    /// Free-text currency, canonicalized during normalization.
    #[serde(default)]
    pub currency: String,
    pub method: PaymentMethod,
    #[serde(default)]
    pub account_id: Option<i64>,
    #[serde(default)]
    pub operator_id: Option<i64>,
    #[serde(default)]
    pub credit_account_id: Option<i64>,
    /// Absent on lines from clients that predate fee modes.
    #[serde(default)]
    pub fee_mode: Option<FeeMode>,
    #[serde(default)]
    pub fee_value: Option<Decimal>,
    /// Fee amount recorded by clients that predate fee modes. Only honored
    /// when `fee_mode` is absent.
    #[serde(default)]
    pub fee_amount: Option<Decimal>,
}

impl PaymentLine {
    #[must_use]
    pub fn new(amount: Decimal, currency: impl Into<String>, method_id: i64) -> Self {
        Self {
            amount,
            currency: currency.into(),
            method: PaymentMethod {
                id: method_id,
                operator_credit: false,
            },
            account_id: None,
            operator_id: None,
            credit_account_id: None,
            fee_mode: None,
            fee_value: None,
            fee_amount: None,
        }
    }

    #[must_use]
    pub fn account(mut self, account_id: i64) -> Self {
        self.account_id = Some(account_id);
        self
    }

    /// Turns the line into an operator-credit payment.
    #[must_use]
    pub fn operator_credit(mut self, operator_id: i64, credit_account_id: i64) -> Self {
        self.method.operator_credit = true;
        self.operator_id = Some(operator_id);
        self.credit_account_id = Some(credit_account_id);
        self
    }

    #[must_use]
    pub fn fee(mut self, mode: FeeMode, value: Decimal) -> Self {
        self.fee_mode = Some(mode);
        self.fee_value = Some(value);
        self
    }

    #[must_use]
    pub fn legacy_fee(mut self, fee_amount: Decimal) -> Self {
        self.fee_amount = Some(fee_amount);
        self
    }
}

/// A validated payment line with its derived fee.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedPaymentLine {
    pub amount: Decimal,
    pub currency: CurrencyCode,
    pub method_id: i64,
    pub account_id: Option<i64>,
    pub operator_id: Option<i64>,
    pub credit_account_id: Option<i64>,
    pub fee_mode: FeeMode,
    pub fee_value: Decimal,
    pub fee_amount: Decimal,
}

impl NormalizedPaymentLine {
    /// Principal plus fee: what the line credits against a debt.
    #[must_use]
    pub fn total(&self) -> Decimal {
        self.amount + self.fee_amount
    }
}

/// Financing fee for one line. Never negative.
///
/// - no mode: the legacy `fee_amount` clamped to `>= 0`, or 0.
/// - `None`: 0.
/// - `Fixed`: `round2(max(0, value))`.
/// - `Percent`: `round2(max(0, amount) * max(0, value) / 100)`.
///
/// Fails with `InvalidInput` when the product does not fit a `Decimal`.
pub fn compute_fee(
    amount: Decimal,
    mode: Option<FeeMode>,
    value: Option<Decimal>,
    legacy_fee: Option<Decimal>,
) -> ResultEngine<Decimal> {
    let value = value.unwrap_or_default().max(Decimal::ZERO);
    let fee = match mode {
        None => legacy_fee.unwrap_or_default().max(Decimal::ZERO),
        Some(FeeMode::None) => Decimal::ZERO,
        Some(FeeMode::Fixed) => value,
        Some(FeeMode::Percent) => amount
            .max(Decimal::ZERO)
            .checked_mul(value)
            .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
            .ok_or_else(amount_too_large)?,
    };
    Ok(round2(fee))
}

/// Validates one line and derives its fee.
pub fn normalize_payment_line(line: &PaymentLine) -> ResultEngine<NormalizedPaymentLine> {
    if line.amount <= Decimal::ZERO {
        return Err(EngineError::InvalidInput(format!(
            "payment amount must be > 0, got {}",
            line.amount
        )));
    }
    ensure_within_limit(line.amount, "payment amount")?;

    if line.method.operator_credit {
        if line.account_id.is_some() {
            return Err(EngineError::InvalidInput(
                "operator credit payments must not reference an account".to_string(),
            ));
        }
        if line.operator_id.is_none() || line.credit_account_id.is_none() {
            return Err(EngineError::InvalidInput(
                "operator credit payments require operator_id and credit_account_id"
                    .to_string(),
            ));
        }
    }

    let fee_mode = line.fee_mode.unwrap_or_default();
    let fee_value = match fee_mode {
        FeeMode::None => Decimal::ZERO,
        FeeMode::Fixed | FeeMode::Percent => {
            let Some(value) = line.fee_value else {
                return Err(EngineError::InvalidInput(format!(
                    "fee mode {} requires a fee value",
                    fee_mode.as_str()
                )));
            };
            if value < Decimal::ZERO {
                return Err(EngineError::InvalidInput(format!(
                    "fee value must be >= 0, got {value}"
                )));
            }
            if fee_mode == FeeMode::Percent && value > MAX_FEE_PERCENT {
                return Err(EngineError::InvalidInput(format!(
                    "fee percentage {value} exceeds {MAX_FEE_PERCENT}"
                )));
            }
            ensure_within_limit(value, "fee value")?;
            value
        }
    };
    if line.fee_mode.is_none()
        && let Some(legacy) = line.fee_amount
    {
        ensure_within_limit(legacy, "fee amount")?;
    }

    let fee_amount = compute_fee(line.amount, line.fee_mode, line.fee_value, line.fee_amount)?;

    Ok(NormalizedPaymentLine {
        amount: line.amount,
        currency: canonicalize(&line.currency),
        method_id: line.method.id,
        account_id: line.account_id,
        operator_id: line.operator_id,
        credit_account_id: line.credit_account_id,
        fee_mode,
        fee_value,
        fee_amount,
    })
}

/// Normalizes every line of a receipt. Fails on the first invalid line.
pub fn normalize_payment_lines(lines: &[PaymentLine]) -> ResultEngine<Vec<NormalizedPaymentLine>> {
    if lines.is_empty() {
        return Err(EngineError::InvalidInput(
            "a receipt needs at least one payment line".to_string(),
        ));
    }
    lines
        .iter()
        .enumerate()
        .map(|(index, line)| {
            normalize_payment_line(line).map_err(|err| match err {
                EngineError::InvalidInput(msg) => {
                    EngineError::InvalidInput(format!("payment line {}: {msg}", index + 1))
                }
                other => other,
            })
        })
        .collect()
}

/// Per-currency principal and fee totals of a set of lines.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentTotals {
    pub amounts: MoneyMap,
    pub fees: MoneyMap,
}

impl PaymentTotals {
    /// Principal plus fees, per currency.
    #[must_use]
    pub fn total(&self) -> MoneyMap {
        let mut out = self.amounts.clone();
        out.merge(&self.fees);
        out
    }
}

#[must_use]
pub fn payment_totals(lines: &[NormalizedPaymentLine]) -> PaymentTotals {
    let mut totals = PaymentTotals::default();
    for line in lines {
        totals.amounts.add(line.currency, line.amount);
        totals.fees.add(line.currency, line.fee_amount);
    }
    totals
}
