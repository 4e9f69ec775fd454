//! The module contains the errors the engine can return.
//!
//! - [`InvalidInput`] malformed amounts, currencies, fee specs or counters.
//! - [`AlreadySettled`] the ledger scope has nothing left to collect.
//! - [`AmbiguousCurrency`] mixed-currency payment lines without a conversion.
//! - [`Overpayment`] the receipt leaves a negative balance and no beneficiary
//!   was named for the excess.
//! - [`AllocationOutOfBounds`] a per-service split outside the scope or above
//!   the money the receipt carries.
//! - [`CurrencyMismatch`] figures in different currencies added together.
//!
//!  [`InvalidInput`]: EngineError::InvalidInput
//!  [`AlreadySettled`]: EngineError::AlreadySettled
//!  [`AmbiguousCurrency`]: EngineError::AmbiguousCurrency
//!  [`Overpayment`]: EngineError::Overpayment
//!  [`AllocationOutOfBounds`]: EngineError::AllocationOutOfBounds
//!  [`CurrencyMismatch`]: EngineError::CurrencyMismatch
use sea_orm::DbErr;
use thiserror::Error;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Already settled: {0}")]
    AlreadySettled(String),
    #[error("Ambiguous currency: {0}")]
    AmbiguousCurrency(String),
    #[error("Overpayment: {0}")]
    Overpayment(String),
    #[error("Allocation out of bounds: {0}")]
    AllocationOutOfBounds(String),
    #[error("Currency mismatch: {0}")]
    CurrencyMismatch(String),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::InvalidInput(a), Self::InvalidInput(b)) => a == b,
            (Self::AlreadySettled(a), Self::AlreadySettled(b)) => a == b,
            (Self::AmbiguousCurrency(a), Self::AmbiguousCurrency(b)) => a == b,
            (Self::Overpayment(a), Self::Overpayment(b)) => a == b,
            (Self::AllocationOutOfBounds(a), Self::AllocationOutOfBounds(b)) => a == b,
            (Self::CurrencyMismatch(a), Self::CurrencyMismatch(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
