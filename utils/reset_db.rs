use anyhow::Context;
use sea_orm::{ConnectionTrait, Database, DbBackend, Statement};
use std::env;

/// Dropped in dependency order; `seaql_migrations` last so `serve` re-creates everything.
const STATEMENTS: &[&str] = &[
    "DROP MATERIALIZED VIEW IF EXISTS trending_products CASCADE",
    "DROP FUNCTION IF EXISTS match_assets CASCADE",
    "DROP TABLE IF EXISTS fulfillment_orders CASCADE",
    "DROP TABLE IF EXISTS pipeline_runs CASCADE",
    "DROP TABLE IF EXISTS analytics_events CASCADE",
    "DROP TABLE IF EXISTS asset_embeddings CASCADE",
    "DROP TABLE IF EXISTS asset_variants CASCADE",
    "DROP TABLE IF EXISTS assets CASCADE",
    "DROP FUNCTION IF EXISTS set_updated_at() CASCADE",
    "DROP TABLE IF EXISTS seaql_migrations CASCADE",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().init();

    let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let db = Database::connect(database_url)
        .await
        .context("failed to connect to database")?;

    for sql in STATEMENTS {
        db.execute(Statement::from_string(DbBackend::Postgres, sql.to_string()))
            .await
            .with_context(|| format!("failed: {sql}"))?;
        tracing::info!("Reset | {}", sql);
    }
    tracing::info!("Reset | Database reset successfully");
    Ok(())
}
