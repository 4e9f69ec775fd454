//! Receipts as read back from the store, and their normalized paid lines.
//!
//! Receipt rows were written by several generations of the receipt form, so
//! the same payment can be recorded as per-service allocations, as a currency
//! conversion, as per-line payments or as a bare amount. [`ReceiptForDebt::schema`]
//! names which of those shapes a row carries and [`ReceiptForDebt::normalize`]
//! turns it, once, into [`PaidLine`]s. The ledger never looks at the raw row.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    CurrencyCode, DEBT_TOLERANCE, MoneyMap, ServiceAllocation, canonicalize,
    payments::NormalizedPaymentLine,
};

pub type ReceiptId = i64;
pub type ServiceId = i64;
pub type ClientId = i64;

/// A per-line payment stored with a receipt.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReceiptPayment {
    pub amount: Decimal,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub fee_amount: Option<Decimal>,
}

impl ReceiptPayment {
    fn fee(&self) -> Decimal {
        self.fee_amount.unwrap_or_default().max(Decimal::ZERO)
    }
}

/// A prior receipt of a booking, as loaded by the store. Immutable once read.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReceiptForDebt {
    pub id: ReceiptId,
    pub amount: Decimal,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub base_amount: Option<Decimal>,
    #[serde(default)]
    pub base_currency: Option<String>,
    #[serde(default)]
    pub payments: Vec<ReceiptPayment>,
    #[serde(default)]
    pub allocations: Vec<ServiceAllocation>,
    /// Aggregate financing fee of the whole receipt.
    #[serde(default)]
    pub fee_total: Option<Decimal>,
}

/// Which shape a stored receipt was recorded with, richest first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptSchema {
    Allocated,
    Converted,
    PerLine,
    Legacy,
}

/// One amount a receipt credits against a debt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaidLine {
    pub currency: CurrencyCode,
    pub amount: Decimal,
    /// Set when the amount was allocated to one service.
    pub service_id: Option<ServiceId>,
}

/// Declared conversion of a receipt into a base currency.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversion {
    pub base_amount: Decimal,
    pub base_currency: CurrencyCode,
}

impl ReceiptForDebt {
    fn conversion(&self) -> Option<Conversion> {
        let base_amount = self.base_amount?;
        let raw = self.base_currency.as_deref()?;
        if raw.trim().is_empty() {
            return None;
        }
        Some(Conversion {
            base_amount,
            base_currency: canonicalize(raw),
        })
    }

    fn principal_currency(&self) -> CurrencyCode {
        canonicalize(&self.currency)
    }

    fn fee_total(&self) -> Decimal {
        self.fee_total.unwrap_or_default().max(Decimal::ZERO)
    }

    #[must_use]
    pub fn schema(&self) -> ReceiptSchema {
        if !self.allocations.is_empty() {
            ReceiptSchema::Allocated
        } else if self.conversion().is_some() {
            ReceiptSchema::Converted
        } else if !self.payments.is_empty() {
            ReceiptSchema::PerLine
        } else {
            ReceiptSchema::Legacy
        }
    }

    /// Converts the row into paid lines according to its [`ReceiptSchema`].
    #[must_use]
    pub fn normalize(&self) -> NormalizedReceipt {
        let schema = self.schema();
        let lines = match schema {
            ReceiptSchema::Allocated => self
                .allocations
                .iter()
                .map(|allocation| PaidLine {
                    currency: allocation.amount_service.currency,
                    amount: allocation.amount_service.amount,
                    service_id: Some(allocation.service_id),
                })
                .collect(),
            ReceiptSchema::Converted => {
                let Some(conversion) = self.conversion() else {
                    return NormalizedReceipt::empty(self.id, schema);
                };
                let fee = if self.payments.is_empty() {
                    if self.principal_currency() == conversion.base_currency {
                        self.fee_total()
                    } else {
                        Decimal::ZERO
                    }
                } else {
                    self.payments
                        .iter()
                        .filter(|p| canonicalize(&p.currency) == conversion.base_currency)
                        .map(ReceiptPayment::fee)
                        .sum()
                };
                vec![PaidLine {
                    currency: conversion.base_currency,
                    amount: conversion.base_amount + fee,
                    service_id: None,
                }]
            }
            ReceiptSchema::PerLine => {
                let mut lines: Vec<PaidLine> = self
                    .payments
                    .iter()
                    .map(|p| PaidLine {
                        currency: canonicalize(&p.currency),
                        amount: p.amount + p.fee(),
                        service_id: None,
                    })
                    .collect();
                let line_fees: Decimal = self.payments.iter().map(ReceiptPayment::fee).sum();
                let remainder = self.fee_total() - line_fees;
                if remainder > DEBT_TOLERANCE {
                    lines.push(PaidLine {
                        currency: self.principal_currency(),
                        amount: remainder,
                        service_id: None,
                    });
                }
                lines
            }
            ReceiptSchema::Legacy => vec![PaidLine {
                currency: self.principal_currency(),
                amount: self.amount + self.fee_total(),
                service_id: None,
            }],
        };

        let allocated_services = (schema == ReceiptSchema::Allocated)
            .then(|| self.allocations.iter().map(|a| a.service_id).collect());

        NormalizedReceipt {
            id: self.id,
            schema,
            allocated_services,
            lines,
        }
    }
}

/// A receipt reduced to the amounts it credits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedReceipt {
    pub id: ReceiptId,
    pub schema: ReceiptSchema,
    /// Services the receipt was explicitly allocated to, if any.
    pub allocated_services: Option<BTreeSet<ServiceId>>,
    pub lines: Vec<PaidLine>,
}

impl NormalizedReceipt {
    fn empty(id: ReceiptId, schema: ReceiptSchema) -> Self {
        Self {
            id,
            schema,
            allocated_services: None,
            lines: Vec::new(),
        }
    }

    /// Unallocated receipts apply to the whole booking; allocated ones only
    /// when one of their services is in scope.
    #[must_use]
    pub fn is_relevant_to(&self, scope: &BTreeSet<ServiceId>) -> bool {
        match &self.allocated_services {
            None => true,
            Some(services) => !services.is_disjoint(scope),
        }
    }

    /// Amounts credited to `scope`, per currency.
    #[must_use]
    pub fn paid_in(&self, scope: &BTreeSet<ServiceId>) -> MoneyMap {
        let mut paid = MoneyMap::new();
        if !self.is_relevant_to(scope) {
            return paid;
        }
        for line in &self.lines {
            match line.service_id {
                Some(service_id) if !scope.contains(&service_id) => {}
                _ => paid.add(line.currency, line.amount),
            }
        }
        paid
    }
}

/// What a receipt that is being created credits, per currency.
///
/// With a declared conversion, the base amount plus the fees of the lines
/// paid in the base currency; otherwise every line's principal plus fee.
#[must_use]
pub fn credited_by(lines: &[NormalizedPaymentLine], conversion: Option<&Conversion>) -> MoneyMap {
    let mut credited = MoneyMap::new();
    match conversion {
        Some(conversion) => {
            let fee: Decimal = lines
                .iter()
                .filter(|l| l.currency == conversion.base_currency)
                .map(|l| l.fee_amount)
                .sum();
            credited.add(conversion.base_currency, conversion.base_amount + fee);
        }
        None => {
            for line in lines {
                credited.add(line.currency, line.total());
            }
        }
    }
    credited
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::Money;

    fn scope(ids: &[ServiceId]) -> BTreeSet<ServiceId> {
        ids.iter().copied().collect()
    }

    #[test]
    fn legacy_receipt_adds_aggregate_fee() {
        let receipt = ReceiptForDebt {
            id: 1,
            amount: dec!(500),
            currency: "$".to_string(),
            fee_total: Some(dec!(25)),
            ..Default::default()
        };
        assert_eq!(receipt.schema(), ReceiptSchema::Legacy);
        let paid = receipt.normalize().paid_in(&scope(&[1]));
        assert_eq!(paid.get(CurrencyCode::ARS), dec!(525));
    }

    #[test]
    fn per_line_receipt_folds_fee_remainder_into_principal_currency() {
        let receipt = ReceiptForDebt {
            id: 2,
            amount: dec!(300),
            currency: "ARS".to_string(),
            payments: vec![
                ReceiptPayment {
                    amount: dec!(200),
                    currency: "ARS".to_string(),
                    fee_amount: Some(dec!(10)),
                },
                ReceiptPayment {
                    amount: dec!(50),
                    currency: "U$D".to_string(),
                    fee_amount: None,
                },
            ],
            fee_total: Some(dec!(15)),
            ..Default::default()
        };
        assert_eq!(receipt.schema(), ReceiptSchema::PerLine);
        let paid = receipt.normalize().paid_in(&scope(&[]));
        assert_eq!(paid.get(CurrencyCode::ARS), dec!(215));
        assert_eq!(paid.get(CurrencyCode::USD), dec!(50));
    }

    #[test]
    fn conversion_wins_over_lines() {
        let receipt = ReceiptForDebt {
            id: 3,
            amount: dec!(100),
            currency: "USD".to_string(),
            base_amount: Some(dec!(120000)),
            base_currency: Some("ARS".to_string()),
            payments: vec![
                ReceiptPayment {
                    amount: dec!(100),
                    currency: "USD".to_string(),
                    fee_amount: Some(dec!(3)),
                },
                ReceiptPayment {
                    amount: dec!(1000),
                    currency: "ARS".to_string(),
                    fee_amount: Some(dec!(40)),
                },
            ],
            ..Default::default()
        };
        assert_eq!(receipt.schema(), ReceiptSchema::Converted);
        let paid = receipt.normalize().paid_in(&scope(&[]));
        assert_eq!(paid.get(CurrencyCode::ARS), dec!(120040));
        assert!(!paid.contains(CurrencyCode::USD));
    }

    #[test]
    fn conversion_without_lines_uses_aggregate_fee_in_same_currency() {
        let receipt = ReceiptForDebt {
            id: 4,
            amount: dec!(1000),
            currency: "ARS".to_string(),
            base_amount: Some(dec!(1000)),
            base_currency: Some("ARS".to_string()),
            fee_total: Some(dec!(50)),
            ..Default::default()
        };
        let paid = receipt.normalize().paid_in(&scope(&[]));
        assert_eq!(paid.get(CurrencyCode::ARS), dec!(1050));
    }

    #[test]
    fn allocations_only_credit_services_in_scope() {
        let receipt = ReceiptForDebt {
            id: 5,
            amount: dec!(900),
            currency: "ARS".to_string(),
            allocations: vec![
                ServiceAllocation::new(10, Money::new(dec!(600), CurrencyCode::ARS)),
                ServiceAllocation::new(11, Money::new(dec!(300), CurrencyCode::ARS)),
            ],
            ..Default::default()
        };
        let normalized = receipt.normalize();
        assert_eq!(normalized.schema, ReceiptSchema::Allocated);

        assert_eq!(normalized.paid_in(&scope(&[10])).get(CurrencyCode::ARS), dec!(600));
        assert_eq!(normalized.paid_in(&scope(&[10, 11])).get(CurrencyCode::ARS), dec!(900));
        assert!(normalized.paid_in(&scope(&[12])).is_empty());
        assert!(!normalized.is_relevant_to(&scope(&[12])));
    }

    #[test]
    fn credited_by_prefers_conversion() {
        let lines = crate::normalize_payment_lines(&[
            crate::PaymentLine::new(dec!(100), "USD", 1)
                .fee(crate::FeeMode::Fixed, dec!(2)),
        ])
        .unwrap();
        let plain = credited_by(&lines, None);
        assert_eq!(plain.get(CurrencyCode::USD), dec!(102));

        let conversion = Conversion {
            base_amount: dec!(110000),
            base_currency: CurrencyCode::ARS,
        };
        let converted = credited_by(&lines, Some(&conversion));
        assert_eq!(converted.get(CurrencyCode::ARS), dec!(110000));
        assert!(!converted.contains(CurrencyCode::USD));
    }
}
