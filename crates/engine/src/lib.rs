//! Receipt reconciliation and fiscal apportionment for a travel agency
//! back office.
//!
//! Everything except the agency counters is a pure function of its inputs.
//! The counters are the only shared state and live in the database behind
//! [`Engine`].

pub use allocation::{ServiceAllocation, validate_allocations};
pub use counters::{AgencyId, CounterKey};
pub use currency::{CurrencyCode, canonicalize};
pub use error::EngineError;
pub use fiscal::{
    AdjustedBreakdown, BreakdownField, BreakdownWarning, FiscalBreakdown, FiscalInputs,
    FiscalReport, ManualOverrides, compute_breakdown,
};
pub use ledger::{
    AgencyConfig, LedgerInput, LedgerScope, LedgerState, ServiceForDebt, compute_ledger,
    ensure_unambiguous, resolve_scope,
};
pub use money::{DEBT_TOLERANCE, MAX_AMOUNT, Money, MoneyMap, is_negligible, parse_amount, round2};
pub use ops::{Engine, EngineBuilder};
pub use overpayment::{ClientCreditExcessDescriptor, OverpaymentRequest, route_overpayment};
pub use payments::{
    FeeMode, MAX_FEE_PERCENT, NormalizedPaymentLine, PaymentLine, PaymentMethod, PaymentTotals,
    compute_fee, normalize_payment_line, normalize_payment_lines, payment_totals,
};
pub use planner::{BookingContext, ReceiptDraft, ReceiptPlan, plan_receipt};
pub use receipts::{
    ClientId, Conversion, NormalizedReceipt, PaidLine, ReceiptForDebt, ReceiptId, ReceiptPayment,
    ReceiptSchema, ServiceId, credited_by,
};

mod allocation;
mod counters;
mod currency;
mod error;
mod fiscal;
mod ledger;
mod money;
mod ops;
mod overpayment;
mod payments;
mod planner;
mod receipts;

pub type ResultEngine<T> = Result<T, EngineError>;
