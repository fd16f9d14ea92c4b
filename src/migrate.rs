use anyhow::Result;
use sqlx::SqlitePool;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Create evidence records table. Rows are keyed by a content hash so the
    // same record cached under different queries is stored once.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS evidence_records (
            id TEXT PRIMARY KEY,
            query_hash TEXT,
            record_json TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL,
            access_count INTEGER NOT NULL DEFAULT 0,
            last_accessed INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create query results table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS query_results (
            query_hash TEXT PRIMARY KEY,
            query_json TEXT NOT NULL,
            record_ids_json TEXT NOT NULL,
            total_found INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL,
            access_count INTEGER NOT NULL DEFAULT 0,
            last_accessed INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_records_query_hash ON evidence_records(query_hash)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_expires ON evidence_records(expires_at)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_queries_expires ON query_results(expires_at)")
        .execute(pool)
        .await?;

    Ok(())
}
