use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(FulfillmentOrders::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(FulfillmentOrders::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(FulfillmentOrders::OrderId).big_integer().not_null())
                    .col(ColumnDef::new(FulfillmentOrders::OrderName).string())
                    .col(ColumnDef::new(FulfillmentOrders::LineItemId).big_integer().not_null())
                    .col(ColumnDef::new(FulfillmentOrders::AssetId).uuid())
                    .col(ColumnDef::new(FulfillmentOrders::DriveFileId).string())
                    .col(ColumnDef::new(FulfillmentOrders::ArtworkTitle).string())
                    .col(ColumnDef::new(FulfillmentOrders::Artist).string())
                    .col(ColumnDef::new(FulfillmentOrders::Size).string())
                    .col(ColumnDef::new(FulfillmentOrders::Frame).string())
                    .col(ColumnDef::new(FulfillmentOrders::PriceTier).string())
                    .col(ColumnDef::new(FulfillmentOrders::PreviewUrl).text())
                    .col(ColumnDef::new(FulfillmentOrders::Quantity).integer().not_null().default(1))
                    .col(
                        ColumnDef::new(FulfillmentOrders::Recipient)
                            .json_binary()
                            .not_null()
                            .default(Expr::cust("'{}'::jsonb")),
                    )
                    .col(
                        ColumnDef::new(FulfillmentOrders::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(FulfillmentOrders::PrintfulOrderId).big_integer())
                    .col(ColumnDef::new(FulfillmentOrders::Error).text())
                    .col(
                        ColumnDef::new(FulfillmentOrders::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(FulfillmentOrders::UpdatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_fulfillment_orders_asset_id")
                            .from(FulfillmentOrders::Table, FulfillmentOrders::AssetId)
                            .to(Assets::Table, Assets::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .unique()
                    .name("idx_fulfillment_orders_order_line")
                    .table(FulfillmentOrders::Table)
                    .col(FulfillmentOrders::OrderId)
                    .col(FulfillmentOrders::LineItemId)
                    .to_owned(),
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                "CREATE TRIGGER fulfillment_orders_set_updated_at BEFORE UPDATE ON fulfillment_orders \
                 FOR EACH ROW EXECUTE FUNCTION set_updated_at()",
            )
            .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(FulfillmentOrders::Table).if_exists().to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum FulfillmentOrders {
    Table,
    Id,
    OrderId,
    OrderName,
    LineItemId,
    AssetId,
    DriveFileId,
    ArtworkTitle,
    Artist,
    Size,
    Frame,
    PriceTier,
    PreviewUrl,
    Quantity,
    Recipient,
    Status,
    PrintfulOrderId,
    Error,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Assets {
    Table,
    Id,
}
