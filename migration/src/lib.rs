pub use sea_orm_migration::prelude::*;

mod m20250101_000001_create_assets_table;
mod m20250101_000002_create_asset_variants_table;
mod m20250101_000003_create_asset_embeddings_table;
mod m20250101_000004_create_analytics_events_table;
mod m20250101_000005_create_pipeline_runs_table;
mod m20250101_000006_create_fulfillment_orders_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_create_assets_table::Migration),
            Box::new(m20250101_000002_create_asset_variants_table::Migration),
            Box::new(m20250101_000003_create_asset_embeddings_table::Migration),
            Box::new(m20250101_000004_create_analytics_events_table::Migration),
            Box::new(m20250101_000005_create_pipeline_runs_table::Migration),
            Box::new(m20250101_000006_create_fulfillment_orders_table::Migration),
        ]
    }
}
