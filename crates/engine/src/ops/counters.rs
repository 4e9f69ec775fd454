use std::{future::Future, time::Duration};

use chrono::Utc;
use sea_orm::{
    ActiveValue, ConnectionTrait, TransactionTrait, prelude::*,
    sea_query::{Expr, OnConflict},
};

use crate::{
    ResultEngine,
    counters::{self, AgencyId, ensure_counter_value, normalize_key},
};

use super::{Engine, with_tx};

const MAX_ATTEMPTS: u32 = 6;
const BACKOFF_BASE: Duration = Duration::from_millis(15);

fn is_contention(err: &DbErr) -> bool {
    let msg = err.to_string().to_ascii_lowercase();
    msg.contains("database is locked") || msg.contains("busy")
}

/// Retries `attempt` while SQLite reports a locked/busy database.
async fn retry_on_contention<T, F, Fut>(op: &'static str, mut attempt: F) -> ResultEngine<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbErr>>,
{
    let mut tries = 1;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) if tries < MAX_ATTEMPTS && is_contention(&err) => {
                let delay = BACKOFF_BASE * 2u32.pow(tries - 1);
                tracing::warn!(op, tries, ?delay, "counter contention, retrying");
                tokio::time::sleep(delay).await;
                tries += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

fn new_row(agency_id: AgencyId, key: &str, next_value: i64) -> counters::ActiveModel {
    counters::ActiveModel {
        agency_id: ActiveValue::Set(agency_id),
        key: ActiveValue::Set(key.to_string()),
        next_value: ActiveValue::Set(next_value),
        updated_at: ActiveValue::Set(Utc::now()),
    }
}

fn conflict_target() -> OnConflict {
    OnConflict::columns([counters::Column::AgencyId, counters::Column::Key])
}

/// `next_value = next_value + 1`, or a fresh row holding 2.
async fn increment<C: ConnectionTrait>(
    db: &C,
    agency_id: AgencyId,
    key: &str,
) -> Result<counters::Model, DbErr> {
    counters::Entity::insert(new_row(agency_id, key, 2))
        .on_conflict(
            conflict_target()
                .value(
                    counters::Column::NextValue,
                    Expr::col((counters::Entity, counters::Column::NextValue)).add(1),
                )
                .update_column(counters::Column::UpdatedAt)
                .to_owned(),
        )
        .exec_with_returning(db)
        .await
}

/// `next_value = max(next_value, minimum)`.
async fn raise<C: ConnectionTrait>(
    db: &C,
    agency_id: AgencyId,
    key: &str,
    minimum: i64,
) -> Result<counters::Model, DbErr> {
    counters::Entity::insert(new_row(agency_id, key, minimum))
        .on_conflict(
            conflict_target()
                .value(
                    counters::Column::NextValue,
                    Expr::cust("MAX(agency_counters.next_value, excluded.next_value)"),
                )
                .update_column(counters::Column::UpdatedAt)
                .to_owned(),
        )
        .exec_with_returning(db)
        .await
}

/// `next_value = value`.
async fn overwrite<C: ConnectionTrait>(
    db: &C,
    agency_id: AgencyId,
    key: &str,
    value: i64,
) -> Result<counters::Model, DbErr> {
    counters::Entity::insert(new_row(agency_id, key, value))
        .on_conflict(
            conflict_target()
                .update_columns([counters::Column::NextValue, counters::Column::UpdatedAt])
                .to_owned(),
        )
        .exec_with_returning(db)
        .await
}

impl Engine {
    /// Hands out the next value of an agency sequence.
    ///
    /// The read-increment-return is a single upsert statement, so concurrent
    /// callers for the same `(agency_id, key)` never see the same value. The
    /// first call for a key returns 1.
    pub async fn next_counter(&self, agency_id: AgencyId, key: &str) -> ResultEngine<i64> {
        let key = normalize_key(key)?;
        let db = &self.database;
        let key = key.as_str();
        let row = retry_on_contention("next", move || increment(db, agency_id, key)).await?;
        tracing::debug!(agency_id, key, value = row.next_value - 1, "counter issued");
        Ok(row.next_value - 1)
    }

    /// Raises the stored next value to at least `minimum`; never lowers it.
    ///
    /// Returns the next value that will be handed out.
    pub async fn set_counter_at_least(
        &self,
        agency_id: AgencyId,
        key: &str,
        minimum: i64,
    ) -> ResultEngine<i64> {
        let key = normalize_key(key)?;
        ensure_counter_value(minimum)?;
        let db = &self.database;
        let key = key.as_str();
        let row =
            retry_on_contention("set_at_least", move || raise(db, agency_id, key, minimum)).await?;
        tracing::info!(agency_id, key, minimum, next = row.next_value, "counter raised");
        Ok(row.next_value)
    }

    /// Administrative override of the stored next value. May move it backwards.
    pub async fn set_counter_exact(
        &self,
        agency_id: AgencyId,
        key: &str,
        value: i64,
    ) -> ResultEngine<()> {
        let key = normalize_key(key)?;
        ensure_counter_value(value)?;
        with_tx!(self, |db_tx| {
            let previous = counters::Entity::find_by_id((agency_id, key.clone()))
                .one(&db_tx)
                .await?
                .map(|row| row.next_value);
            overwrite(&db_tx, agency_id, key.as_str(), value).await?;
            tracing::info!(agency_id, key = key.as_str(), ?previous, value, "counter overridden");
            Ok(())
        })
    }

    /// Next value of a sequence without consuming it; `None` if never used.
    pub async fn peek_counter(&self, agency_id: AgencyId, key: &str) -> ResultEngine<Option<i64>> {
        let key = normalize_key(key)?;
        let row = counters::Entity::find_by_id((agency_id, key))
            .one(&self.database)
            .await?;
        Ok(row.map(|row| row.next_value))
    }
}
