//! Storage contracts consumed by the proposal core, plus an in-process
//! implementation and a timeout/circuit-breaker wrapper for any backend.

use crate::circuit_breaker::{create_store_circuit_breaker, StoreCircuitBreaker};
use crate::errors::AppError;
use crate::models::{Pagination, Plan, Proposal, ProposalFilter, ProposalStatus, StatusCount};
use crate::proposal_number::parse_sequence;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Document store for proposals.
#[async_trait::async_trait]
pub trait ProposalStore: Send + Sync {
    /// Inserts a new proposal. Fails with `DuplicateProposalNumber` when the
    /// number is already taken.
    async fn insert(&self, proposal: &Proposal) -> Result<(), AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Proposal>, AppError>;

    /// Highest non-degraded proposal number starting with `prefix`.
    async fn latest_number_with_prefix(&self, prefix: &str) -> Result<Option<String>, AppError>;

    /// Next sequence for a month prefix.
    ///
    /// The default reads the latest number and adds one, which races under
    /// concurrent callers; backends override it with an atomic counter.
    async fn next_sequence(&self, prefix: &str) -> Result<u32, AppError> {
        match self.latest_number_with_prefix(prefix).await? {
            Some(latest) => parse_sequence(&latest, prefix)
                .map(|n| n + 1)
                .ok_or_else(|| {
                    AppError::AllocationFailure(format!(
                        "cannot parse sequence of latest proposal number {}",
                        latest
                    ))
                }),
            None => Ok(1),
        }
    }

    /// Replaces the stored document if its version still equals
    /// `expected_version`. Returns the stored proposal with the bumped version.
    async fn save(&self, proposal: &Proposal, expected_version: i64) -> Result<Proposal, AppError>;

    /// Newest first.
    async fn find(
        &self,
        filter: &ProposalFilter,
        pagination: Pagination,
    ) -> Result<Vec<Proposal>, AppError>;

    async fn count(&self, filter: &ProposalFilter) -> Result<u64, AppError>;

    async fn status_breakdown(&self) -> Result<Vec<StatusCount>, AppError>;
}

/// Read-only plan catalog lookups.
#[async_trait::async_trait]
pub trait PlanStore: Send + Sync {
    async fn find_plan(&self, id: Uuid) -> Result<Option<Plan>, AppError>;
}

// ============ In-memory store ============

#[derive(Default)]
struct MemoryState {
    proposals: HashMap<Uuid, Proposal>,
    numbers: HashMap<String, Uuid>,
    sequences: HashMap<String, u32>,
    plans: HashMap<Uuid, Plan>,
}

impl MemoryState {
    fn latest_number(&self, prefix: &str) -> Option<String> {
        self.proposals
            .values()
            .filter(|p| !p.number_degraded && p.proposal_number.starts_with(prefix))
            .map(|p| p.proposal_number.clone())
            .max()
    }
}

/// Process-local store used by tests and local development.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_plan(&self, plan: Plan) {
        self.state.lock().await.plans.insert(plan.id, plan);
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.proposals.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait::async_trait]
impl ProposalStore for MemoryStore {
    async fn insert(&self, proposal: &Proposal) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        if state.numbers.contains_key(&proposal.proposal_number) {
            return Err(AppError::DuplicateProposalNumber(
                proposal.proposal_number.clone(),
            ));
        }
        if state.proposals.contains_key(&proposal.id) {
            return Err(AppError::BadRequest(format!(
                "Proposal {} already exists",
                proposal.id
            )));
        }
        state
            .numbers
            .insert(proposal.proposal_number.clone(), proposal.id);
        state.proposals.insert(proposal.id, proposal.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Proposal>, AppError> {
        Ok(self.state.lock().await.proposals.get(&id).cloned())
    }

    async fn latest_number_with_prefix(&self, prefix: &str) -> Result<Option<String>, AppError> {
        Ok(self.state.lock().await.latest_number(prefix))
    }

    async fn next_sequence(&self, prefix: &str) -> Result<u32, AppError> {
        let mut state = self.state.lock().await;
        let current = match state.sequences.get(prefix) {
            Some(value) => *value,
            None => state
                .latest_number(prefix)
                .and_then(|n| parse_sequence(&n, prefix))
                .unwrap_or(0),
        };
        let next = current + 1;
        state.sequences.insert(prefix.to_string(), next);
        Ok(next)
    }

    async fn save(&self, proposal: &Proposal, expected_version: i64) -> Result<Proposal, AppError> {
        let mut state = self.state.lock().await;
        let stored = state
            .proposals
            .get_mut(&proposal.id)
            .ok_or_else(|| AppError::NotFound(format!("Proposal {} not found", proposal.id)))?;

        if stored.version != expected_version {
            return Err(AppError::ConcurrentModification(format!(
                "proposal {} is at version {}, expected {}",
                proposal.id, stored.version, expected_version
            )));
        }
        if stored.proposal_number != proposal.proposal_number {
            return Err(AppError::BadRequest(
                "proposalNumber is immutable".to_string(),
            ));
        }

        let mut next = proposal.clone();
        next.version = expected_version + 1;
        *stored = next.clone();
        Ok(next)
    }

    async fn find(
        &self,
        filter: &ProposalFilter,
        pagination: Pagination,
    ) -> Result<Vec<Proposal>, AppError> {
        let state = self.state.lock().await;
        let mut matches: Vec<&Proposal> = state
            .proposals
            .values()
            .filter(|p| filter.matches(p))
            .collect();
        matches.sort_by(|a, b| {
            b.submitted_at
                .cmp(&a.submitted_at)
                .then_with(|| b.proposal_number.cmp(&a.proposal_number))
        });
        Ok(matches
            .into_iter()
            .skip(pagination.offset() as usize)
            .take(pagination.limit as usize)
            .cloned()
            .collect())
    }

    async fn count(&self, filter: &ProposalFilter) -> Result<u64, AppError> {
        let state = self.state.lock().await;
        Ok(state.proposals.values().filter(|p| filter.matches(p)).count() as u64)
    }

    async fn status_breakdown(&self) -> Result<Vec<StatusCount>, AppError> {
        let state = self.state.lock().await;
        let mut counts: HashMap<ProposalStatus, u64> = HashMap::new();
        for proposal in state.proposals.values() {
            *counts.entry(proposal.status).or_insert(0) += 1;
        }
        Ok(ProposalStatus::ALL
            .iter()
            .filter_map(|status| {
                counts.get(status).map(|count| StatusCount {
                    status: *status,
                    count: *count,
                })
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl PlanStore for MemoryStore {
    async fn find_plan(&self, id: Uuid) -> Result<Option<Plan>, AppError> {
        Ok(self.state.lock().await.plans.get(&id).cloned())
    }
}

// ============ Guarded store ============

/// Wraps a backend so every call carries a timeout and passes through a
/// circuit breaker. Only infrastructure failures count against the breaker.
pub struct GuardedStore<S> {
    inner: S,
    breaker: StoreCircuitBreaker,
    timeout: Duration,
}

impl<S> GuardedStore<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self {
            inner,
            breaker: create_store_circuit_breaker(),
            timeout,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn guard<T, F>(&self, op: &'static str, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, AppError>> + Send,
        T: Send,
    {
        use failsafe::futures::CircuitBreaker;

        let timeout = self.timeout;
        let timed = async move {
            match tokio::time::timeout(timeout, fut).await {
                Ok(result) => result,
                Err(_) => Err(AppError::StoreUnavailable(format!(
                    "{} timed out after {}ms",
                    op,
                    timeout.as_millis()
                ))),
            }
        };

        match self
            .breaker
            .call_with(|e: &AppError| e.is_infrastructure(), timed)
            .await
        {
            Ok(value) => Ok(value),
            Err(failsafe::Error::Inner(e)) => Err(e),
            Err(failsafe::Error::Rejected) => {
                tracing::warn!("Store circuit open, rejecting {}", op);
                Err(AppError::StoreUnavailable(format!(
                    "circuit open, {} rejected",
                    op
                )))
            }
        }
    }
}

#[async_trait::async_trait]
impl<S: ProposalStore> ProposalStore for GuardedStore<S> {
    async fn insert(&self, proposal: &Proposal) -> Result<(), AppError> {
        self.guard("insert", self.inner.insert(proposal)).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Proposal>, AppError> {
        self.guard("find_by_id", self.inner.find_by_id(id)).await
    }

    async fn latest_number_with_prefix(&self, prefix: &str) -> Result<Option<String>, AppError> {
        self.guard(
            "latest_number_with_prefix",
            self.inner.latest_number_with_prefix(prefix),
        )
        .await
    }

    async fn next_sequence(&self, prefix: &str) -> Result<u32, AppError> {
        self.guard("next_sequence", self.inner.next_sequence(prefix))
            .await
    }

    async fn save(&self, proposal: &Proposal, expected_version: i64) -> Result<Proposal, AppError> {
        self.guard("save", self.inner.save(proposal, expected_version))
            .await
    }

    async fn find(
        &self,
        filter: &ProposalFilter,
        pagination: Pagination,
    ) -> Result<Vec<Proposal>, AppError> {
        self.guard("find", self.inner.find(filter, pagination)).await
    }

    async fn count(&self, filter: &ProposalFilter) -> Result<u64, AppError> {
        self.guard("count", self.inner.count(filter)).await
    }

    async fn status_breakdown(&self) -> Result<Vec<StatusCount>, AppError> {
        self.guard("status_breakdown", self.inner.status_breakdown())
            .await
    }
}

#[async_trait::async_trait]
impl<S: PlanStore> PlanStore for GuardedStore<S> {
    async fn find_plan(&self, id: Uuid) -> Result<Option<Plan>, AppError> {
        self.guard("find_plan", self.inner.find_plan(id)).await
    }
}
