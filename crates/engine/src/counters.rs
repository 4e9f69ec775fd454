//! Per-agency sequence counters.
//!
//! Each `(agency_id, key)` row stores the next value to hand out. The
//! operations on it live in [`crate::Engine`].

use std::fmt;

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;

use crate::{EngineError, ResultEngine};

/// Agency identifier.
pub type AgencyId = i64;

/// Human-facing sequences kept per agency.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CounterKey {
    Receipt,
    Booking,
    Client,
    Invoice,
    CreditNote,
}

impl CounterKey {
    pub const ALL: [CounterKey; 5] = [
        Self::Receipt,
        Self::Booking,
        Self::Client,
        Self::Invoice,
        Self::CreditNote,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Receipt => "receipt",
            Self::Booking => "booking",
            Self::Client => "client",
            Self::Invoice => "invoice",
            Self::CreditNote => "credit_note",
        }
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for CounterKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

pub(crate) fn normalize_key(key: &str) -> ResultEngine<String> {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return Err(EngineError::InvalidInput(
            "counter key must not be empty".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn ensure_counter_value(value: i64) -> ResultEngine<()> {
    if value < 1 {
        return Err(EngineError::InvalidInput(format!(
            "counter value must be >= 1, got {value}"
        )));
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "agency_counters")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub agency_id: i64,
    #[sea_orm(primary_key, auto_increment = false)]
    pub key: String,
    pub next_value: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
