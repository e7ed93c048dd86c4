use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AssetVariants::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(AssetVariants::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(AssetVariants::AssetId).uuid().not_null())
                    .col(ColumnDef::new(AssetVariants::Label).string().not_null())
                    .col(ColumnDef::new(AssetVariants::WidthCm).double().not_null())
                    .col(ColumnDef::new(AssetVariants::HeightCm).double().not_null())
                    .col(ColumnDef::new(AssetVariants::WidthInches).double().not_null())
                    .col(ColumnDef::new(AssetVariants::HeightInches).double().not_null())
                    .col(ColumnDef::new(AssetVariants::EffectiveDpi).double().not_null())
                    .col(ColumnDef::new(AssetVariants::QualityGrade).string().not_null())
                    .col(ColumnDef::new(AssetVariants::SortOrder).integer().not_null().default(0))
                    .col(
                        ColumnDef::new(AssetVariants::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_asset_variants_asset_id")
                            .from(AssetVariants::Table, AssetVariants::AssetId)
                            .to(Assets::Table, Assets::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_asset_variants_asset_id")
                    .table(AssetVariants::Table)
                    .col(AssetVariants::AssetId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AssetVariants::Table).if_exists().to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum AssetVariants {
    Table,
    Id,
    AssetId,
    Label,
    WidthCm,
    HeightCm,
    WidthInches,
    HeightInches,
    EffectiveDpi,
    QualityGrade,
    SortOrder,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Assets {
    Table,
    Id,
}
