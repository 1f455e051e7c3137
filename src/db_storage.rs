use crate::errors::{AppError, ResultExt};
use crate::models::{
    Pagination, Plan, PlanStatus, PlanType, Proposal, ProposalFilter, ProposalStatus, StatusCount,
};
use crate::store::{PlanStore, ProposalStore};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

/// PostgreSQL-backed proposal and plan store.
///
/// Proposals are kept as JSONB documents with the fields used for lookup,
/// uniqueness and optimistic locking mirrored into columns.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

#[derive(Debug, FromRow)]
struct PlanRow {
    id: Uuid,
    name: String,
    provider: String,
    plan_type: String,
    sum_insured: i64,
    status: String,
}

impl TryFrom<PlanRow> for Plan {
    type Error = AppError;

    fn try_from(row: PlanRow) -> Result<Self, Self::Error> {
        let plan_type: PlanType = row.plan_type.parse().map_err(AppError::InternalError)?;
        let status: PlanStatus = serde_json::from_value(serde_json::Value::String(row.status))?;
        Ok(Plan {
            id: row.id,
            name: row.name,
            provider: row.provider,
            plan_type,
            sum_insured: row.sum_insured,
            status,
        })
    }
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Inserts or replaces a catalog entry.
    pub async fn upsert_plan(&self, plan: &Plan) -> Result<(), AppError> {
        let status = serde_json::to_value(plan.status)?;
        sqlx::query(
            r#"
            INSERT INTO plans (id, name, provider, plan_type, sum_insured, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                provider = EXCLUDED.provider,
                plan_type = EXCLUDED.plan_type,
                sum_insured = EXCLUDED.sum_insured,
                status = EXCLUDED.status
            "#,
        )
        .bind(plan.id)
        .bind(&plan.name)
        .bind(&plan.provider)
        .bind(plan.plan_type.as_str())
        .bind(plan.sum_insured)
        .bind(status.as_str().unwrap_or("active"))
        .execute(&self.pool)
        .await
        .context("upserting plan")?;
        Ok(())
    }
}

fn map_insert_error(err: sqlx::Error, number: &str) -> AppError {
    if let Some(db_err) = err.as_database_error() {
        let on_number = db_err
            .constraint()
            .map(|c| c.contains("proposal_number"))
            .unwrap_or(false);
        if db_err.is_unique_violation() && on_number {
            return AppError::DuplicateProposalNumber(number.to_string());
        }
    }
    AppError::DatabaseError(err)
}

/// Escapes LIKE wildcards in user-supplied search terms.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &ProposalFilter) {
    qb.push(" WHERE TRUE");
    if let Some(ref user_id) = filter.user_id {
        qb.push(" AND user_id = ").push_bind(user_id.clone());
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(ref agent_id) = filter.agent_id {
        qb.push(" AND document->'assignedAgent'->>'agentId' = ")
            .push_bind(agent_id.clone());
    }
    if let Some(from) = filter.date_from {
        qb.push(" AND submitted_at >= ").push_bind(from);
    }
    if let Some(to) = filter.date_to {
        qb.push(" AND submitted_at <= ").push_bind(to);
    }
    if let Some(ref term) = filter.search {
        let pattern = format!("%{}%", escape_like(term));
        qb.push(" AND (proposal_number ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR document->'personalInfo'->>'firstName' ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR document->'personalInfo'->>'lastName' ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR document->'personalInfo'->>'email' ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

#[async_trait::async_trait]
impl ProposalStore for PgStore {
    async fn insert(&self, proposal: &Proposal) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO proposals (
                id, proposal_number, number_degraded, user_id, status,
                submitted_at, version, document
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(proposal.id)
        .bind(&proposal.proposal_number)
        .bind(proposal.number_degraded)
        .bind(&proposal.user_id)
        .bind(proposal.status.as_str())
        .bind(proposal.submitted_at)
        .bind(proposal.version)
        .bind(Json(proposal))
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, &proposal.proposal_number))?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Proposal>, AppError> {
        let row: Option<(Json<Proposal>, i64)> =
            sqlx::query_as("SELECT document, version FROM proposals WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .context("loading proposal")?;

        Ok(row.map(|(Json(mut proposal), version)| {
            proposal.version = version;
            proposal
        }))
    }

    async fn latest_number_with_prefix(&self, prefix: &str) -> Result<Option<String>, AppError> {
        let latest = sqlx::query_scalar::<_, String>(
            r#"
            SELECT proposal_number FROM proposals
            WHERE proposal_number LIKE $1 AND NOT number_degraded
            ORDER BY proposal_number DESC
            LIMIT 1
            "#,
        )
        .bind(format!("{}%", escape_like(prefix)))
        .fetch_optional(&self.pool)
        .await
        .context("reading latest proposal number")?;

        Ok(latest)
    }

    async fn next_sequence(&self, prefix: &str) -> Result<u32, AppError> {
        // Seeded from the month's latest stored number the first time the
        // period is seen, then incremented atomically.
        let value: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO proposal_sequences (period, last_value)
            VALUES (
                $1,
                COALESCE((
                    SELECT MAX(CAST(RIGHT(proposal_number, 4) AS INTEGER))
                    FROM proposals
                    WHERE proposal_number ~ ('^' || $1 || '[0-9]{4}$')
                      AND NOT number_degraded
                ), 0) + 1
            )
            ON CONFLICT (period) DO UPDATE
            SET last_value = proposal_sequences.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(prefix)
        .fetch_one(&self.pool)
        .await
        .context("advancing proposal sequence")?;

        u32::try_from(value)
            .map_err(|_| AppError::AllocationFailure(format!("negative sequence {}", value)))
    }

    async fn save(&self, proposal: &Proposal, expected_version: i64) -> Result<Proposal, AppError> {
        let mut next = proposal.clone();
        next.version = expected_version + 1;

        let result = sqlx::query(
            r#"
            UPDATE proposals
            SET status = $1, version = $2, document = $3
            WHERE id = $4 AND version = $5 AND proposal_number = $6
            "#,
        )
        .bind(next.status.as_str())
        .bind(next.version)
        .bind(Json(&next))
        .bind(next.id)
        .bind(expected_version)
        .bind(&next.proposal_number)
        .execute(&self.pool)
        .await
        .context("saving proposal")?;

        if result.rows_affected() == 1 {
            return Ok(next);
        }

        let current: Option<(i64, String)> =
            sqlx::query_as("SELECT version, proposal_number FROM proposals WHERE id = $1")
                .bind(next.id)
                .fetch_optional(&self.pool)
                .await
                .context("checking proposal after failed save")?;

        Err(match current {
            None => AppError::NotFound(format!("Proposal {} not found", next.id)),
            Some((_, number)) if number != next.proposal_number => {
                AppError::BadRequest("proposalNumber is immutable".to_string())
            }
            Some((version, _)) => AppError::ConcurrentModification(format!(
                "proposal {} is at version {}, expected {}",
                next.id, version, expected_version
            )),
        })
    }

    async fn find(
        &self,
        filter: &ProposalFilter,
        pagination: Pagination,
    ) -> Result<Vec<Proposal>, AppError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT document, version FROM proposals");
        push_filter(&mut qb, filter);
        qb.push(" ORDER BY submitted_at DESC, proposal_number DESC LIMIT ")
            .push_bind(pagination.limit as i64)
            .push(" OFFSET ")
            .push_bind(pagination.offset() as i64);

        let rows: Vec<(Json<Proposal>, i64)> = qb
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .context("listing proposals")?;

        Ok(rows
            .into_iter()
            .map(|(Json(mut proposal), version)| {
                proposal.version = version;
                proposal
            })
            .collect())
    }

    async fn count(&self, filter: &ProposalFilter) -> Result<u64, AppError> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM proposals");
        push_filter(&mut qb, filter);

        let total: i64 = qb
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .context("counting proposals")?;

        Ok(total.max(0) as u64)
    }

    async fn status_breakdown(&self) -> Result<Vec<StatusCount>, AppError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM proposals GROUP BY status")
                .fetch_all(&self.pool)
                .await
                .context("aggregating proposal statuses")?;

        let mut counts: Vec<StatusCount> = rows
            .into_iter()
            .filter_map(|(status, count)| match status.parse::<ProposalStatus>() {
                Ok(status) => Some(StatusCount {
                    status,
                    count: count.max(0) as u64,
                }),
                Err(e) => {
                    tracing::warn!("Skipping unknown status in breakdown: {}", e);
                    None
                }
            })
            .collect();

        counts.sort_by_key(|c| {
            ProposalStatus::ALL
                .iter()
                .position(|s| *s == c.status)
                .unwrap_or(usize::MAX)
        });
        Ok(counts)
    }
}

#[async_trait::async_trait]
impl PlanStore for PgStore {
    async fn find_plan(&self, id: Uuid) -> Result<Option<Plan>, AppError> {
        let row: Option<PlanRow> = sqlx::query_as(
            "SELECT id, name, provider, plan_type, sum_insured, status FROM plans WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("loading plan")?;

        row.map(Plan::try_from).transpose()
    }
}
