use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS asset_embeddings (
    asset_id uuid PRIMARY KEY REFERENCES assets(id) ON DELETE CASCADE,
    embedding vector(768) NOT NULL,
    embedding_text text NOT NULL,
    created_at timestamp NOT NULL DEFAULT now(),
    updated_at timestamp NOT NULL DEFAULT now()
)
"#;

const CREATE_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_asset_embeddings_cosine
    ON asset_embeddings USING hnsw (embedding vector_cosine_ops)
"#;

const CREATE_MATCH_FN: &str = r#"
CREATE OR REPLACE FUNCTION match_assets(
    query_vector vector(768),
    match_threshold double precision,
    match_count integer
)
RETURNS TABLE (
    asset_id uuid,
    title text,
    artist text,
    style text,
    drive_file_id text,
    shopify_product_id text,
    similarity double precision
)
LANGUAGE sql STABLE AS $$
    SELECT
        a.id,
        a.title::text,
        a.artist::text,
        a.style::text,
        a.drive_file_id::text,
        a.shopify_product_id::text,
        1 - (e.embedding <=> query_vector) AS similarity
    FROM asset_embeddings e
    JOIN assets a ON a.id = e.asset_id
    WHERE a.shopify_status = 'synced'
      AND 1 - (e.embedding <=> query_vector) > match_threshold
    ORDER BY e.embedding <=> query_vector ASC
    LIMIT match_count
$$;
"#;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared("CREATE EXTENSION IF NOT EXISTS vector").await?;
        db.execute_unprepared(CREATE_TABLE).await?;
        db.execute_unprepared(CREATE_INDEX).await?;
        db.execute_unprepared(CREATE_MATCH_FN).await?;
        db.execute_unprepared(
            "CREATE TRIGGER asset_embeddings_set_updated_at BEFORE UPDATE ON asset_embeddings \
             FOR EACH ROW EXECUTE FUNCTION set_updated_at()",
        )
        .await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared("DROP FUNCTION IF EXISTS match_assets(vector, double precision, integer)")
            .await?;
        db.execute_unprepared("DROP TABLE IF EXISTS asset_embeddings").await?;
        Ok(())
    }
}
