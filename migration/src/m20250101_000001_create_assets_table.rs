use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

const UPDATED_AT_TRIGGER_FN: &str = r#"
CREATE OR REPLACE FUNCTION set_updated_at() RETURNS trigger AS $$
BEGIN
    NEW.updated_at = now();
    RETURN NEW;
END;
$$ LANGUAGE plpgsql;
"#;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Assets::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Assets::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Assets::DriveFileId).string().unique_key())
                    .col(ColumnDef::new(Assets::Filename).string().not_null())
                    .col(ColumnDef::new(Assets::Path).string())
                    .col(ColumnDef::new(Assets::MimeType).string())
                    .col(ColumnDef::new(Assets::SizeBytes).big_integer())
                    .col(ColumnDef::new(Assets::Md5Checksum).string())
                    .col(ColumnDef::new(Assets::WidthPx).integer())
                    .col(ColumnDef::new(Assets::HeightPx).integer())
                    .col(ColumnDef::new(Assets::AspectRatio).double())
                    .col(ColumnDef::new(Assets::RatioClass).string())
                    .col(ColumnDef::new(Assets::MaxPrintWidthCm).double())
                    .col(ColumnDef::new(Assets::MaxPrintHeightCm).double())
                    .col(ColumnDef::new(Assets::QualityTier).string())
                    .col(ColumnDef::new(Assets::Artist).string())
                    .col(ColumnDef::new(Assets::Title).string())
                    .col(ColumnDef::new(Assets::Description).text())
                    .col(ColumnDef::new(Assets::Style).string())
                    .col(ColumnDef::new(Assets::Mood).string())
                    .col(ColumnDef::new(Assets::Subject).string())
                    .col(ColumnDef::new(Assets::Era).string())
                    .col(ColumnDef::new(Assets::Palette).string())
                    .col(
                        ColumnDef::new(Assets::AiTags)
                            .array(ColumnType::Text)
                            .not_null()
                            .default(Expr::cust("'{}'::text[]")),
                    )
                    .col(
                        ColumnDef::new(Assets::IngestionStatus)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(Assets::ShopifyStatus)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(Assets::IngestionError).text())
                    .col(ColumnDef::new(Assets::ShopifyProductId).string())
                    .col(ColumnDef::new(Assets::ShopifyProductGid).string())
                    .col(ColumnDef::new(Assets::ShopifySyncedAt).timestamp())
                    .col(
                        ColumnDef::new(Assets::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Assets::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .check(Expr::cust(
                        "shopify_status <> 'synced' OR shopify_product_id IS NOT NULL",
                    ))
                    .to_owned(),
            )
            .await?;

        for (name, column) in [
            ("idx_assets_ingestion_status", Assets::IngestionStatus),
            ("idx_assets_shopify_status", Assets::ShopifyStatus),
            ("idx_assets_ratio_class", Assets::RatioClass),
            ("idx_assets_style", Assets::Style),
            ("idx_assets_era", Assets::Era),
            ("idx_assets_artist", Assets::Artist),
            ("idx_assets_quality_tier", Assets::QualityTier),
            ("idx_assets_created_at", Assets::CreatedAt),
        ] {
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name(name)
                        .table(Assets::Table)
                        .col(column)
                        .to_owned(),
                )
                .await?;
        }

        let db = manager.get_connection();
        db.execute_unprepared(
            "CREATE INDEX IF NOT EXISTS idx_assets_pending_sync \
             ON assets (shopify_status, ingestion_status) \
             WHERE shopify_status = 'pending'",
        )
        .await?;
        db.execute_unprepared(UPDATED_AT_TRIGGER_FN).await?;
        db.execute_unprepared(
            "CREATE TRIGGER assets_set_updated_at BEFORE UPDATE ON assets \
             FOR EACH ROW EXECUTE FUNCTION set_updated_at()",
        )
        .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Assets::Table).if_exists().to_owned())
            .await?;
        manager
            .get_connection()
            .execute_unprepared("DROP FUNCTION IF EXISTS set_updated_at() CASCADE")
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Assets {
    Table,
    Id,
    DriveFileId,
    Filename,
    Path,
    MimeType,
    SizeBytes,
    Md5Checksum,
    WidthPx,
    HeightPx,
    AspectRatio,
    RatioClass,
    MaxPrintWidthCm,
    MaxPrintHeightCm,
    QualityTier,
    Artist,
    Title,
    Description,
    Style,
    Mood,
    Subject,
    Era,
    Palette,
    AiTags,
    IngestionStatus,
    ShopifyStatus,
    IngestionError,
    ShopifyProductId,
    ShopifyProductGid,
    ShopifySyncedAt,
    CreatedAt,
    UpdatedAt,
}
