//! Per-agency sequence counters.
//!
//! One row per `(agency_id, key)`; `next_value` is the value the next call
//! will hand out.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
enum AgencyCounters {
    Table,
    AgencyId,
    Key,
    NextValue,
    UpdatedAt,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AgencyCounters::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AgencyCounters::AgencyId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(AgencyCounters::Key).string().not_null())
                    .col(
                        ColumnDef::new(AgencyCounters::NextValue)
                            .big_integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(AgencyCounters::UpdatedAt)
                            .timestamp()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(AgencyCounters::AgencyId)
                            .col(AgencyCounters::Key),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AgencyCounters::Table).to_owned())
            .await?;

        Ok(())
    }
}
