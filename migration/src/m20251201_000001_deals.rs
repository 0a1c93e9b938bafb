use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
pub(crate) enum Deals {
    Table,
    Id,
    Title,
    CurrentStage,
    SubReason,
    Version,
    StageChangedAt,
    ClosedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Deals::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Deals::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Deals::Title).string_len(255).not_null())
                    .col(
                        ColumnDef::new(Deals::CurrentStage)
                            .string_len(32)
                            .not_null()
                            .default("NEW_REQUEST"),
                    )
                    .col(ColumnDef::new(Deals::SubReason).text())
                    .col(
                        ColumnDef::new(Deals::Version)
                            .big_integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(Deals::StageChangedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Deals::ClosedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Deals::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Deals::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_deals_current_stage")
                    .table(Deals::Table)
                    .col(Deals::CurrentStage)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_deals_stage_changed_at")
                    .table(Deals::Table)
                    .col(Deals::StageChangedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Deals::Table).if_exists().to_owned())
            .await
    }
}
