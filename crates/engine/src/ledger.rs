//! Currency-bucketed debt ledger of a booking.
//!
//! The ledger compares what the services in scope sell for against what prior
//! receipts already paid, one currency at a time, and then applies the receipt
//! being created on top. It is a pure function of a snapshot: the caller is
//! expected to read the snapshot and persist the new receipt inside the same
//! per-booking transaction.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    CurrencyCode, EngineError, MoneyMap, ReceiptForDebt, ReceiptId, ResultEngine, ServiceId,
    canonicalize, payments::NormalizedPaymentLine, receipts::Conversion,
};

/// Agency-level switches that change how receipts are reconciled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgencyConfig {
    /// Receipts settle the whole booking instead of selected services.
    #[serde(default)]
    pub booking_sale_mode: bool,
    /// Fiscal figures are entered by hand; card interest is not derived.
    #[serde(default)]
    pub manual_breakdown: bool,
    /// Default bank transfer fee, as a fraction of the sale price.
    #[serde(default)]
    pub transfer_fee_pct: Decimal,
}

/// A booking service as seen by the ledger.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceForDebt {
    pub id: ServiceId,
    pub sale_price: Decimal,
    #[serde(default)]
    pub currency: String,
    /// Combined card interest surcharge.
    #[serde(default)]
    pub card_interest: Option<Decimal>,
    /// Pre-split card interest: taxable part.
    #[serde(default)]
    pub taxable_card_interest: Option<Decimal>,
    /// Pre-split card interest: VAT part.
    #[serde(default)]
    pub vat_on_card_interest: Option<Decimal>,
}

impl ServiceForDebt {
    #[must_use]
    pub fn new(id: ServiceId, sale_price: Decimal, currency: impl Into<String>) -> Self {
        Self {
            id,
            sale_price,
            currency: currency.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn card_interest(mut self, amount: Decimal) -> Self {
        self.card_interest = Some(amount);
        self
    }

    #[must_use]
    pub fn split_card_interest(mut self, taxable: Decimal, vat: Decimal) -> Self {
        self.taxable_card_interest = Some(taxable);
        self.vat_on_card_interest = Some(vat);
        self
    }

    #[must_use]
    pub fn currency_code(&self) -> CurrencyCode {
        canonicalize(&self.currency)
    }

    /// Card interest owed on top of the sale price. The taxable/VAT pair
    /// wins over the combined figure when present.
    #[must_use]
    pub fn card_interest_total(&self) -> Decimal {
        let split = self.taxable_card_interest.unwrap_or_default()
            + self.vat_on_card_interest.unwrap_or_default();
        if split > Decimal::ZERO {
            split
        } else {
            self.card_interest.unwrap_or_default().max(Decimal::ZERO)
        }
    }

    /// What the service sells for, as owed by the client.
    #[must_use]
    pub fn amount_owed(&self, config: &AgencyConfig) -> Decimal {
        if config.manual_breakdown {
            self.sale_price
        } else {
            self.sale_price + self.card_interest_total()
        }
    }
}

/// Services a receipt is reconciled against.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerScope {
    pub whole_booking: bool,
    pub services: BTreeSet<ServiceId>,
}

/// Resolves the ledger scope of a receipt.
///
/// In booking-sale mode every service of the booking is in scope. Otherwise
/// the selection must be non-empty and belong to the booking.
pub fn resolve_scope(
    config: &AgencyConfig,
    booking_services: &[ServiceForDebt],
    selected: &[ServiceId],
) -> ResultEngine<LedgerScope> {
    let booking: BTreeSet<ServiceId> = booking_services.iter().map(|s| s.id).collect();

    if config.booking_sale_mode {
        return Ok(LedgerScope {
            whole_booking: true,
            services: booking,
        });
    }

    if selected.is_empty() {
        return Err(EngineError::InvalidInput(
            "select at least one service of the booking".to_string(),
        ));
    }
    if let Some(stray) = selected.iter().find(|id| !booking.contains(id)) {
        return Err(EngineError::AllocationOutOfBounds(format!(
            "service {stray} does not belong to the booking"
        )));
    }

    Ok(LedgerScope {
        whole_booking: false,
        services: selected.iter().copied().collect(),
    })
}

/// Rejects mixed-currency payment lines that do not declare a conversion.
pub fn ensure_unambiguous(
    lines: &[NormalizedPaymentLine],
    conversion: Option<&Conversion>,
) -> ResultEngine<()> {
    if conversion.is_some() {
        return Ok(());
    }
    let currencies: BTreeSet<CurrencyCode> = lines.iter().map(|l| l.currency).collect();
    if currencies.len() > 1 {
        let listed: Vec<&str> = currencies.iter().map(CurrencyCode::code).collect();
        return Err(EngineError::AmbiguousCurrency(format!(
            "payment lines use {} and no base amount/currency was given",
            listed.join(", ")
        )));
    }
    Ok(())
}

/// Everything the ledger needs, borrowed from the caller's snapshot.
#[derive(Clone, Copy, Debug)]
pub struct LedgerInput<'a> {
    pub config: &'a AgencyConfig,
    pub services: &'a [ServiceForDebt],
    pub scope: &'a LedgerScope,
    pub prior_receipts: &'a [ReceiptForDebt],
    /// Receipt being edited: its stored version must not count as paid.
    pub editing_receipt: Option<ReceiptId>,
    /// What the new receipt credits, per currency.
    pub current: &'a MoneyMap,
}

/// Per-currency state of a ledger scope.
///
/// `debt = sales - paid` and `debt_after = debt - current_paid`, bucket by
/// bucket. Negative values are overpayments.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    pub sales: MoneyMap,
    pub paid: MoneyMap,
    pub debt: MoneyMap,
    pub current_paid: MoneyMap,
    pub debt_after: MoneyMap,
}

impl LedgerState {
    /// Currencies with something left to collect before the new receipt.
    #[must_use]
    pub fn outstanding(&self) -> MoneyMap {
        self.debt.outstanding()
    }

    /// Fails with [`EngineError::AlreadySettled`] when nothing is owed.
    pub fn ensure_outstanding(&self) -> ResultEngine<()> {
        if self.outstanding().is_empty() {
            return Err(EngineError::AlreadySettled(format!(
                "nothing left to collect (sales {}, paid {})",
                self.sales, self.paid
            )));
        }
        Ok(())
    }

    /// Absolute overpayment per currency once the new receipt is applied.
    #[must_use]
    pub fn excess(&self) -> MoneyMap {
        self.debt_after.excess()
    }
}

/// Computes the ledger state of a scope. Deterministic: the same snapshot
/// always yields the same maps.
#[must_use]
pub fn compute_ledger(input: &LedgerInput<'_>) -> LedgerState {
    let scope = &input.scope.services;

    let sales: MoneyMap = input
        .services
        .iter()
        .filter(|service| scope.contains(&service.id))
        .map(|service| (service.currency_code(), service.amount_owed(input.config)))
        .collect();

    let mut paid = MoneyMap::new();
    for receipt in input.prior_receipts {
        if input.editing_receipt == Some(receipt.id) {
            continue;
        }
        paid.merge(&receipt.normalize().paid_in(scope));
    }

    let sales = sales.rounded();
    let paid = paid.rounded();
    let current_paid = input.current.rounded();
    let debt = sales.minus(&paid);
    let debt_after = debt.minus(&current_paid);

    tracing::debug!(
        services = scope.len(),
        receipts = input.prior_receipts.len(),
        %sales,
        %paid,
        %current_paid,
        "ledger computed"
    );

    LedgerState {
        sales,
        paid,
        debt,
        current_paid,
        debt_after,
    }
}
