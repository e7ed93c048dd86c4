use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

const CREATE_TRENDING_VIEW: &str = r#"
CREATE MATERIALIZED VIEW IF NOT EXISTS trending_products AS
SELECT
    asset_id,
    max(product_id) AS product_id,
    sum(CASE event_type
        WHEN 'purchase' THEN 10
        WHEN 'add_to_cart' THEN 5
        WHEN 'click' THEN 2
        WHEN 'view' THEN 1
        ELSE 0
    END)::double precision AS score,
    count(*) AS event_count
FROM analytics_events
WHERE created_at > now() - interval '7 days'
  AND asset_id IS NOT NULL
GROUP BY asset_id
"#;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AnalyticsEvents::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(AnalyticsEvents::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(AnalyticsEvents::EventType).string().not_null())
                    .col(ColumnDef::new(AnalyticsEvents::ProductId).string())
                    .col(ColumnDef::new(AnalyticsEvents::AssetId).uuid())
                    .col(ColumnDef::new(AnalyticsEvents::CollectionId).string())
                    .col(ColumnDef::new(AnalyticsEvents::SearchQuery).text())
                    .col(ColumnDef::new(AnalyticsEvents::SessionId).string().not_null())
                    .col(
                        ColumnDef::new(AnalyticsEvents::Metadata)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'{}'::jsonb")),
                    )
                    .col(
                        ColumnDef::new(AnalyticsEvents::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        for (name, column) in [
            ("idx_analytics_events_event_type", AnalyticsEvents::EventType),
            ("idx_analytics_events_asset_id", AnalyticsEvents::AssetId),
            ("idx_analytics_events_created_at", AnalyticsEvents::CreatedAt),
        ] {
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name(name)
                        .table(AnalyticsEvents::Table)
                        .col(column)
                        .to_owned(),
                )
                .await?;
        }

        let db = manager.get_connection();
        db.execute_unprepared(CREATE_TRENDING_VIEW).await?;
        // CONCURRENTLY refreshes need a unique index on the view
        db.execute_unprepared(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_trending_products_asset_id ON trending_products (asset_id)",
        )
        .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP MATERIALIZED VIEW IF EXISTS trending_products")
            .await?;
        manager
            .drop_table(Table::drop().table(AnalyticsEvents::Table).if_exists().to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum AnalyticsEvents {
    Table,
    Id,
    EventType,
    ProductId,
    AssetId,
    CollectionId,
    SearchQuery,
    SessionId,
    Metadata,
    CreatedAt,
}
