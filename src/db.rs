use sqlx::{postgres::PgPoolOptions, PgPool};

/// Schema for plans, proposal documents and per-month number sequences.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS plans (
        id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        provider TEXT NOT NULL,
        plan_type TEXT NOT NULL,
        sum_insured BIGINT NOT NULL,
        status TEXT NOT NULL DEFAULT 'active'
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS proposals (
        id UUID PRIMARY KEY,
        proposal_number TEXT NOT NULL UNIQUE,
        number_degraded BOOLEAN NOT NULL DEFAULT FALSE,
        user_id TEXT NOT NULL,
        status TEXT NOT NULL,
        submitted_at TIMESTAMPTZ NOT NULL,
        version BIGINT NOT NULL DEFAULT 0,
        document JSONB NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS proposals_user_status_idx ON proposals (user_id, status)",
    "CREATE INDEX IF NOT EXISTS proposals_status_submitted_idx ON proposals (status, submitted_at DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS proposal_sequences (
        period TEXT PRIMARY KEY,
        last_value INTEGER NOT NULL
    )
    "#,
];

pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        sqlx::query("SELECT 1").execute(&pool).await?;

        Ok(Self { pool })
    }

    /// Creates missing tables and indexes. Safe to run on every start.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        for statement in SCHEMA {
            sqlx::query(*statement).execute(&self.pool).await?;
        }
        tracing::info!("Database schema is up to date");
        Ok(())
    }
}
