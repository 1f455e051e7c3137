#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use insurance_proposals_api::errors::AppError;
use insurance_proposals_api::models::*;
use insurance_proposals_api::services::{Clock, ProposalService, ServiceSettings};
use insurance_proposals_api::store::{MemoryStore, PlanStore, ProposalStore};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use uuid::Uuid;

pub fn july_2024() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 15, 10, 30, 0).unwrap()
}

pub fn fixed_clock(at: DateTime<Utc>) -> Clock {
    Arc::new(move || at)
}

pub fn plan(sum_insured: i64) -> Plan {
    Plan {
        id: Uuid::new_v4(),
        name: "Family Floater Gold".to_string(),
        provider: "Acme Health".to_string(),
        plan_type: PlanType::Family,
        sum_insured,
        status: PlanStatus::Active,
    }
}

pub fn submission(plan_id: Uuid) -> SubmitProposalRequest {
    serde_json::from_value(serde_json::json!({
        "planId": plan_id,
        "personalInfo": {
            "firstName": "Asha",
            "lastName": "Rao",
            "email": "asha@example.com",
            "phone": "9876543210",
            "dateOfBirth": "1990-04-02",
            "gender": "female",
            "address": {
                "street": "12 MG Road",
                "city": "Pune",
                "state": "MH",
                "pincode": "411001"
            }
        },
        "premiumDetails": {
            "basePremium": "12000",
            "totalAnnualPremium": "12000",
            "totalMonthlyPremium": "1000"
        }
    }))
    .unwrap()
}

/// A stored proposal with the given number, bypassing allocation.
pub fn stored_proposal(number: &str, user_id: &str, submitted_at: DateTime<Utc>) -> Proposal {
    serde_json::from_value(serde_json::json!({
        "id": Uuid::new_v4(),
        "proposalNumber": number,
        "planId": Uuid::new_v4(),
        "userId": user_id,
        "personalInfo": {
            "firstName": "Ravi", "lastName": "Kumar", "email": "ravi@example.com",
            "phone": "9123456780", "dateOfBirth": "1985-01-20", "gender": "male",
            "address": {"street": "4 Ring Rd", "city": "Delhi", "state": "DL", "pincode": "110001"}
        },
        "premiumDetails": {
            "basePremium": "8000", "totalAnnualPremium": "8000", "totalMonthlyPremium": "667"
        },
        "status": "submitted",
        "statusHistory": [],
        "requiredDocuments": [],
        "policyDetails": null,
        "rejectionDetails": null,
        "assignedAgent": null,
        "submittedAt": submitted_at,
        "lastUpdatedAt": submitted_at
    }))
    .unwrap()
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub service: ProposalService,
    pub plan: Plan,
}

pub async fn harness_with(settings: ServiceSettings, sum_insured: i64) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let plan = plan(sum_insured);
    store.insert_plan(plan.clone()).await;

    let proposals: Arc<dyn ProposalStore> = store.clone();
    let plans: Arc<dyn PlanStore> = store.clone();
    let service =
        ProposalService::new(proposals, plans, settings).with_clock(fixed_clock(july_2024()));

    Harness {
        store,
        service,
        plan,
    }
}

pub async fn harness() -> Harness {
    harness_with(ServiceSettings::default(), 300_000).await
}

/// Memory store with injectable faults.
#[derive(Default)]
pub struct FaultyStore {
    pub inner: MemoryStore,
    /// `next_sequence` always errors.
    pub fail_sequence: bool,
    /// Hands out sequences from this counter, ignoring stored numbers.
    pub stale_counter: Option<AtomicU32>,
    /// Every insert reports a duplicate number.
    pub always_duplicate: bool,
    /// Number of upcoming saves that report a concurrent modification.
    pub save_conflicts: AtomicU32,
    pub insert_attempts: AtomicU32,
    pub save_attempts: AtomicU32,
}

#[async_trait::async_trait]
impl ProposalStore for FaultyStore {
    async fn insert(&self, proposal: &Proposal) -> Result<(), AppError> {
        self.insert_attempts.fetch_add(1, Ordering::SeqCst);
        if self.always_duplicate {
            return Err(AppError::DuplicateProposalNumber(
                proposal.proposal_number.clone(),
            ));
        }
        self.inner.insert(proposal).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Proposal>, AppError> {
        self.inner.find_by_id(id).await
    }

    async fn latest_number_with_prefix(&self, prefix: &str) -> Result<Option<String>, AppError> {
        self.inner.latest_number_with_prefix(prefix).await
    }

    async fn next_sequence(&self, prefix: &str) -> Result<u32, AppError> {
        if self.fail_sequence {
            return Err(AppError::StoreUnavailable(
                "sequence backend down".to_string(),
            ));
        }
        match self.stale_counter {
            Some(ref counter) => Ok(counter.fetch_add(1, Ordering::SeqCst) + 1),
            None => self.inner.next_sequence(prefix).await,
        }
    }

    async fn save(&self, proposal: &Proposal, expected_version: i64) -> Result<Proposal, AppError> {
        self.save_attempts.fetch_add(1, Ordering::SeqCst);
        let pending = self.save_conflicts.load(Ordering::SeqCst);
        if pending > 0 {
            self.save_conflicts.store(pending - 1, Ordering::SeqCst);
            return Err(AppError::ConcurrentModification(format!(
                "proposal {} changed underneath",
                proposal.id
            )));
        }
        self.inner.save(proposal, expected_version).await
    }

    async fn find(
        &self,
        filter: &ProposalFilter,
        pagination: Pagination,
    ) -> Result<Vec<Proposal>, AppError> {
        self.inner.find(filter, pagination).await
    }

    async fn count(&self, filter: &ProposalFilter) -> Result<u64, AppError> {
        self.inner.count(filter).await
    }

    async fn status_breakdown(&self) -> Result<Vec<StatusCount>, AppError> {
        self.inner.status_breakdown().await
    }
}

#[async_trait::async_trait]
impl PlanStore for FaultyStore {
    async fn find_plan(&self, id: Uuid) -> Result<Option<Plan>, AppError> {
        self.inner.find_plan(id).await
    }
}

pub async fn faulty_service(store: FaultyStore) -> (Arc<FaultyStore>, ProposalService, Plan) {
    let plan = plan(300_000);
    store.inner.insert_plan(plan.clone()).await;
    let store = Arc::new(store);

    let proposals: Arc<dyn ProposalStore> = store.clone();
    let plans: Arc<dyn PlanStore> = store.clone();
    let service = ProposalService::new(proposals, plans, ServiceSettings::default())
        .with_clock(fixed_clock(july_2024()));

    (store, service, plan)
}
