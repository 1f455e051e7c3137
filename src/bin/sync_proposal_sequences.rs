//! Script to re-seed the per-month proposal number counters.
//!
//! Needed after importing proposals from another system or restoring a
//! backup: the counters must never lag behind the highest stored number of
//! their month, or new submissions will collide until the retry budget runs out.

use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use std::env;

/// Main entry point for the sync script.
///
/// Raises every `proposal_sequences` row to at least the highest
/// non-degraded sequence stored for its month, creating missing rows.
/// Pass `--dry-run` to only report what would change.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt::init();

    let dry_run = env::args().any(|arg| arg == "--dry-run");

    // Database connection
    let database_url = env::var("DB_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .map_err(|_| "DB_URL or DATABASE_URL must be set")?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    tracing::info!("Connected to database. Scanning stored proposal numbers...");

    let stored: Vec<(String, i32, Option<i32>)> = sqlx::query_as(
        r#"
        SELECT LEFT(p.proposal_number, 8) AS period,
               MAX(CAST(RIGHT(p.proposal_number, 4) AS INTEGER)) AS highest,
               s.last_value
        FROM proposals p
        LEFT JOIN proposal_sequences s ON s.period = LEFT(p.proposal_number, 8)
        WHERE p.proposal_number ~ '^HI[0-9]{10}$'
          AND NOT p.number_degraded
        GROUP BY LEFT(p.proposal_number, 8), s.last_value
        ORDER BY period
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let mut behind = 0;
    for (period, highest, current) in &stored {
        match current {
            Some(value) if value >= highest => {
                tracing::debug!("{}: counter {} is current", period, value);
            }
            _ => {
                behind += 1;
                tracing::warn!(
                    "{}: counter {:?} is behind highest stored sequence {}",
                    period,
                    current,
                    highest
                );
            }
        }
    }

    if dry_run {
        tracing::info!(
            "Dry run complete. {} of {} months need re-seeding.",
            behind,
            stored.len()
        );
        return Ok(());
    }

    let result = sqlx::query(
        r#"
        INSERT INTO proposal_sequences (period, last_value)
        SELECT LEFT(proposal_number, 8), MAX(CAST(RIGHT(proposal_number, 4) AS INTEGER))
        FROM proposals
        WHERE proposal_number ~ '^HI[0-9]{10}$'
          AND NOT number_degraded
        GROUP BY LEFT(proposal_number, 8)
        ON CONFLICT (period) DO UPDATE
        SET last_value = GREATEST(proposal_sequences.last_value, EXCLUDED.last_value)
        "#,
    )
    .execute(&pool)
    .await?;

    tracing::info!(
        "Sync complete. {} months touched, {} were behind.",
        result.rows_affected(),
        behind
    );

    Ok(())
}
