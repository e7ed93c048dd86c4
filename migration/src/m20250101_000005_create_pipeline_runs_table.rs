use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PipelineRuns::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(PipelineRuns::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(PipelineRuns::RunType).string().not_null())
                    .col(ColumnDef::new(PipelineRuns::Status).string().not_null())
                    .col(ColumnDef::new(PipelineRuns::ItemsProcessed).integer().not_null().default(0))
                    .col(ColumnDef::new(PipelineRuns::ItemsSucceeded).integer().not_null().default(0))
                    .col(ColumnDef::new(PipelineRuns::ItemsFailed).integer().not_null().default(0))
                    .col(ColumnDef::new(PipelineRuns::StartedAt).timestamp().not_null())
                    .col(ColumnDef::new(PipelineRuns::FinishedAt).timestamp())
                    .col(ColumnDef::new(PipelineRuns::Error).text())
                    .col(
                        ColumnDef::new(PipelineRuns::Metadata)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'{}'::jsonb")),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_pipeline_runs_type_started")
                    .table(PipelineRuns::Table)
                    .col(PipelineRuns::RunType)
                    .col(PipelineRuns::StartedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PipelineRuns::Table).if_exists().to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum PipelineRuns {
    Table,
    Id,
    RunType,
    Status,
    ItemsProcessed,
    ItemsSucceeded,
    ItemsFailed,
    StartedAt,
    FinishedAt,
    Error,
    Metadata,
}
