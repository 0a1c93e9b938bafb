use sea_orm_migration::prelude::*;

use crate::m20251201_000001_deals::Deals;

#[derive(DeriveIden)]
enum StageTransitions {
    Table,
    Id,
    DealId,
    Sequence,
    FromStage,
    ToStage,
    ActorId,
    ActorRole,
    Reason,
    Overridden,
    OccurredAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(StageTransitions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(StageTransitions::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(StageTransitions::DealId).uuid().not_null())
                    .col(
                        ColumnDef::new(StageTransitions::Sequence)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StageTransitions::FromStage)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StageTransitions::ToStage)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(ColumnDef::new(StageTransitions::ActorId).uuid().not_null())
                    .col(
                        ColumnDef::new(StageTransitions::ActorRole)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(ColumnDef::new(StageTransitions::Reason).text())
                    .col(
                        ColumnDef::new(StageTransitions::Overridden)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(StageTransitions::OccurredAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_stage_transitions_deal")
                            .from(StageTransitions::Table, StageTransitions::DealId)
                            .to(Deals::Table, Deals::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // One row per committed deal version; a replayed write cannot land twice.
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("uq_stage_transitions_deal_sequence")
                    .table(StageTransitions::Table)
                    .col(StageTransitions::DealId)
                    .col(StageTransitions::Sequence)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(StageTransitions::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await
    }
}
