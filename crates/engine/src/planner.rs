//! Dry run of a receipt before it is stored.
//!
//! [`plan_receipt`] chains the pure stages in the order the store must apply
//! them: fee normalization, currency ambiguity, ledger scope, ledger state,
//! settled check, allocation bounds and overpayment routing. The first
//! failing stage rejects the whole draft. The caller persists the receipt
//! inside the same per-booking transaction it read the snapshot with.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    AgencyConfig, ClientCreditExcessDescriptor, ClientId, EngineError, LedgerInput, LedgerState,
    MoneyMap, OverpaymentRequest, PaymentLine, ReceiptForDebt, ReceiptId, ResultEngine,
    ServiceAllocation, ServiceForDebt, ServiceId, compute_ledger, ensure_unambiguous,
    normalize_payment_lines, payment_totals,
    payments::{NormalizedPaymentLine, PaymentTotals},
    receipts::{Conversion, credited_by},
    resolve_scope, route_overpayment, validate_allocations,
};

/// Snapshot of the booking a receipt is charged to.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BookingContext {
    #[serde(default)]
    pub config: AgencyConfig,
    pub services: Vec<ServiceForDebt>,
    #[serde(default)]
    pub selected_service_ids: Vec<ServiceId>,
    #[serde(default)]
    pub prior_receipts: Vec<ReceiptForDebt>,
    /// Set when an existing receipt is being edited.
    #[serde(default)]
    pub editing_receipt_id: Option<ReceiptId>,
}

/// A receipt as submitted by the receipt form.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReceiptDraft {
    pub lines: Vec<PaymentLine>,
    #[serde(default)]
    pub conversion: Option<Conversion>,
    /// Receipts outside a booking (e.g. client advances) skip the ledger.
    #[serde(default)]
    pub booking: Option<BookingContext>,
    #[serde(default)]
    pub allocations: Vec<ServiceAllocation>,
    #[serde(default)]
    pub client_ids: Vec<ClientId>,
    #[serde(default)]
    pub overpayment: OverpaymentRequest,
}

impl ReceiptDraft {
    #[must_use]
    pub fn new(lines: Vec<PaymentLine>) -> Self {
        Self {
            lines,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn booking(mut self, booking: BookingContext) -> Self {
        self.booking = Some(booking);
        self
    }

    #[must_use]
    pub fn converted(mut self, conversion: Conversion) -> Self {
        self.conversion = Some(conversion);
        self
    }

    #[must_use]
    pub fn allocate(mut self, allocation: ServiceAllocation) -> Self {
        self.allocations.push(allocation);
        self
    }

    #[must_use]
    pub fn clients(mut self, client_ids: Vec<ClientId>) -> Self {
        self.client_ids = client_ids;
        self
    }

    #[must_use]
    pub fn overpayment(mut self, request: OverpaymentRequest) -> Self {
        self.overpayment = request;
        self
    }
}

/// Everything the store needs to persist an accepted receipt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptPlan {
    pub lines: Vec<NormalizedPaymentLine>,
    pub totals: PaymentTotals,
    /// What the receipt credits against the debt, per currency.
    pub credited: MoneyMap,
    pub ledger: Option<LedgerState>,
    /// Allocated totals per payment currency.
    pub allocated: MoneyMap,
    pub excess: Option<ClientCreditExcessDescriptor>,
}

/// Funds allocations may draw from: the credited amounts and, for a
/// converted receipt, the lines in the currencies they were paid in.
fn available_funds(
    credited: &MoneyMap,
    totals: &PaymentTotals,
    conversion: Option<&Conversion>,
) -> MoneyMap {
    let mut available = credited.clone();
    if let Some(conversion) = conversion {
        for (currency, amount) in totals.total() {
            if currency != conversion.base_currency {
                available.add(currency, amount);
            }
        }
    }
    available
}

/// Validates a receipt draft against its booking snapshot.
pub fn plan_receipt(draft: &ReceiptDraft) -> ResultEngine<ReceiptPlan> {
    let lines = normalize_payment_lines(&draft.lines)?;
    let conversion = draft.conversion.as_ref();
    if let Some(conversion) = conversion
        && conversion.base_amount <= Decimal::ZERO
    {
        return Err(EngineError::InvalidInput(
            "base amount must be > 0".to_string(),
        ));
    }

    let totals = payment_totals(&lines);
    let credited = credited_by(&lines, conversion).rounded();

    let Some(booking) = &draft.booking else {
        if !draft.allocations.is_empty() {
            return Err(EngineError::AllocationOutOfBounds(
                "allocations need a booking".to_string(),
            ));
        }
        tracing::debug!(%credited, "receipt planned without booking");
        return Ok(ReceiptPlan {
            lines,
            totals,
            credited,
            ledger: None,
            allocated: MoneyMap::new(),
            excess: None,
        });
    };

    ensure_unambiguous(&lines, conversion)?;
    let scope = resolve_scope(
        &booking.config,
        &booking.services,
        &booking.selected_service_ids,
    )?;
    let state = compute_ledger(&LedgerInput {
        config: &booking.config,
        services: &booking.services,
        scope: &scope,
        prior_receipts: &booking.prior_receipts,
        editing_receipt: booking.editing_receipt_id,
        current: &credited,
    });
    state.ensure_outstanding()?;

    // In booking-sale mode the scope is every service, so only the amount
    // checks can fail.
    let booking_services: BTreeSet<ServiceId> = booking.services.iter().map(|s| s.id).collect();
    let allocated = validate_allocations(
        &draft.allocations,
        &booking_services,
        &scope.services,
        &available_funds(&credited, &totals, conversion),
    )?;

    let excess = route_overpayment(&state.debt_after, &draft.overpayment, &draft.client_ids)?;

    tracing::debug!(
        %credited,
        debt = %state.debt,
        debt_after = %state.debt_after,
        excess = excess.is_some(),
        "receipt planned"
    );

    Ok(ReceiptPlan {
        lines,
        totals,
        credited,
        ledger: Some(state),
        allocated,
        excess,
    })
}
