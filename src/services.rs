use crate::config::Config;
use crate::documents::{derive_required_documents, mark_uploaded};
use crate::errors::AppError;
use crate::lifecycle::{append_communication, apply_transition, TransitionPolicy};
use crate::models::*;
use crate::proposal_number::ProposalNumberAllocator;
use crate::store::{PlanStore, ProposalStore};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use uuid::Uuid;

/// Source of "now" for every timestamp the service writes.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Identifier recorded for submissions without an authenticated user.
pub const GUEST_USER: &str = "guest";

/// Tunables for [`ProposalService`].
#[derive(Debug, Clone, Copy)]
pub struct ServiceSettings {
    pub transition_policy: TransitionPolicy,
    pub max_allocation_attempts: u32,
    pub max_transition_attempts: u32,
    pub plan_cache_ttl: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            transition_policy: TransitionPolicy::Strict,
            max_allocation_attempts: 5,
            max_transition_attempts: 3,
            plan_cache_ttl: Duration::from_secs(300),
        }
    }
}

impl From<&Config> for ServiceSettings {
    fn from(config: &Config) -> Self {
        Self {
            transition_policy: config.transition_policy,
            max_allocation_attempts: config.max_allocation_attempts,
            max_transition_attempts: config.max_transition_attempts,
            plan_cache_ttl: Duration::from_secs(config.plan_cache_ttl_secs),
        }
    }
}

/// Proposal submission, lifecycle and read operations.
#[derive(Clone)]
pub struct ProposalService {
    proposals: Arc<dyn ProposalStore>,
    plans: Arc<dyn PlanStore>,
    plan_cache: Cache<Uuid, Plan>,
    settings: ServiceSettings,
    clock: Clock,
}

impl ProposalService {
    pub fn new(
        proposals: Arc<dyn ProposalStore>,
        plans: Arc<dyn PlanStore>,
        settings: ServiceSettings,
    ) -> Self {
        let plan_cache = Cache::builder()
            .time_to_live(settings.plan_cache_ttl)
            .max_capacity(1_000)
            .build();

        Self {
            proposals,
            plans,
            plan_cache,
            settings,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    async fn load_plan(&self, plan_id: Uuid) -> Result<Plan, AppError> {
        if let Some(plan) = self.plan_cache.get(&plan_id).await {
            return Ok(plan);
        }

        let plan = self
            .plans
            .find_plan(plan_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Health insurance plan not found".to_string()))?;

        self.plan_cache.insert(plan_id, plan.clone()).await;
        Ok(plan)
    }

    /// Catalog fields for listings; a plan missing from the catalog shows as
    /// "Unknown Plan" rather than failing the whole listing.
    async fn plan_summary(&self, plan_id: Uuid) -> Result<PlanSummary, AppError> {
        match self.load_plan(plan_id).await {
            Ok(plan) => Ok(PlanSummary::from(&plan)),
            Err(e) if matches!(e.root(), AppError::NotFound(_)) => {
                tracing::debug!("Plan {} not in catalog, listing as unknown", plan_id);
                Ok(PlanSummary::unknown())
            }
            Err(e) => Err(e),
        }
    }

    async fn with_plans(&self, proposals: Vec<Proposal>) -> Result<Vec<ProposalListItem>, AppError> {
        let mut items = Vec::with_capacity(proposals.len());
        for proposal in proposals {
            let plan = self.plan_summary(proposal.plan_id).await?;
            items.push(ProposalListItem { proposal, plan });
        }
        Ok(items)
    }

    /// Creates a proposal with a freshly allocated number.
    ///
    /// Retries allocation when the store reports the number as taken; after
    /// `max_allocation_attempts` the submission fails and nothing is stored.
    pub async fn submit(
        &self,
        user_id: &str,
        request: SubmitProposalRequest,
    ) -> Result<Proposal, AppError> {
        validate_submission(&request)?;

        let plan = self.load_plan(request.plan_id).await?;
        if plan.status != PlanStatus::Active {
            tracing::warn!(
                "Proposal submitted against {:?} plan {}",
                plan.status,
                plan.id
            );
        }

        let required_documents =
            derive_required_documents(&request.personal_info, &request.medical_info, &plan);
        let allocator = ProposalNumberAllocator::new(self.proposals.as_ref());

        for attempt in 1..=self.settings.max_allocation_attempts {
            let now = self.now();
            let number = allocator.allocate(now).await;

            let proposal = Proposal {
                id: Uuid::new_v4(),
                proposal_number: number.value,
                number_degraded: number.degraded,
                plan_id: plan.id,
                user_id: user_id.to_string(),
                personal_info: request.personal_info.clone(),
                family_members: request.family_members.clone(),
                medical_info: request.medical_info.clone(),
                selected_add_ons: request.selected_add_ons.clone(),
                premium_details: request.premium_details.clone(),
                status: ProposalStatus::Submitted,
                status_history: vec![StatusHistoryEntry {
                    status: ProposalStatus::Submitted,
                    comment: Some("Proposal submitted by customer".to_string()),
                    updated_by: user_id.to_string(),
                    timestamp: now,
                }],
                required_documents: required_documents.clone(),
                policy_details: None,
                rejection_details: None,
                assigned_agent: None,
                communications: Vec::new(),
                medical_checkup: None,
                payment_info: None,
                internal_notes: Vec::new(),
                submitted_at: now,
                last_updated_at: now,
                version: 0,
            };

            match self.proposals.insert(&proposal).await {
                Ok(()) => {
                    tracing::info!(
                        "Proposal {} submitted by {} for plan {}",
                        proposal.proposal_number,
                        user_id,
                        plan.id
                    );
                    return Ok(proposal);
                }
                Err(e) if matches!(e.root(), AppError::DuplicateProposalNumber(_)) => {
                    tracing::warn!(
                        "Proposal number {} already taken (attempt {}/{})",
                        proposal.proposal_number,
                        attempt,
                        self.settings.max_allocation_attempts
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(AppError::AllocationFailure(format!(
            "no unique proposal number after {} attempts",
            self.settings.max_allocation_attempts
        )))
    }

    pub async fn get(&self, id: Uuid) -> Result<Proposal, AppError> {
        self.proposals
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Proposal not found".to_string()))
    }

    /// Read, mutate, compare-and-swap. A lost race re-reads and re-applies
    /// `mutate` to the fresh document.
    async fn update_with<F>(&self, id: Uuid, mutate: F) -> Result<Proposal, AppError>
    where
        F: Fn(&mut Proposal, DateTime<Utc>) -> Result<(), AppError>,
    {
        let attempts = self.settings.max_transition_attempts;
        for attempt in 1..=attempts {
            let mut proposal = self.get(id).await?;
            let expected_version = proposal.version;
            mutate(&mut proposal, self.now())?;

            match self.proposals.save(&proposal, expected_version).await {
                Ok(saved) => return Ok(saved),
                Err(e) if matches!(e.root(), AppError::ConcurrentModification(_)) => {
                    tracing::warn!(
                        "Proposal {} changed concurrently (attempt {}/{})",
                        id,
                        attempt,
                        attempts
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(AppError::ConcurrentModification(format!(
            "proposal {} kept changing after {} attempts",
            id, attempts
        )))
    }

    pub async fn transition(
        &self,
        id: Uuid,
        request: StatusUpdateRequest,
        updated_by: &str,
    ) -> Result<Proposal, AppError> {
        let policy = self.settings.transition_policy;
        self.update_with(id, |proposal, now| {
            apply_transition(proposal, &request, updated_by, now, policy)
        })
        .await
    }

    pub async fn add_communication(
        &self,
        id: Uuid,
        request: CommunicationRequest,
        sent_by: &str,
    ) -> Result<Proposal, AppError> {
        self.update_with(id, |proposal, now| {
            append_communication(proposal, &request, sent_by, now)
        })
        .await
    }

    pub async fn record_document_upload(
        &self,
        id: Uuid,
        doc_type: DocumentType,
        upload: DocumentUploadRequest,
    ) -> Result<Proposal, AppError> {
        self.update_with(id, |proposal, now| {
            mark_uploaded(
                &mut proposal.required_documents,
                doc_type,
                upload.file_path.clone(),
                upload.file_size,
                upload.mime_type.clone(),
                now,
            )?;
            proposal.last_updated_at = now;
            Ok(())
        })
        .await
    }

    pub async fn list_for_user(
        &self,
        user_id: &str,
        status: Option<ProposalStatus>,
        pagination: Pagination,
    ) -> Result<ProposalPage, AppError> {
        let filter = ProposalFilter {
            status,
            ..ProposalFilter::for_user(user_id)
        };
        let proposals = self.proposals.find(&filter, pagination).await?;
        let total = self.proposals.count(&filter).await?;

        Ok(ProposalPage {
            proposals: self.with_plans(proposals).await?,
            pagination: PageInfo::new(pagination, total),
        })
    }

    pub async fn dashboard(&self, user_id: &str) -> Result<Dashboard, AppError> {
        if user_id.trim().is_empty() {
            return Err(AppError::BadRequest("User ID is required".to_string()));
        }

        let filter = ProposalFilter::for_user(user_id);
        let total = self.proposals.count(&filter).await?;
        let all = Pagination {
            page: 1,
            limit: total.clamp(1, u32::MAX as u64) as u32,
        };
        let proposals = self.proposals.find(&filter, all).await?;
        let stats = dashboard_stats(&proposals);

        tracing::debug!("Dashboard for {}: {:?}", user_id, stats);
        Ok(Dashboard {
            proposals: self.with_plans(proposals).await?,
            stats,
        })
    }

    pub async fn list_all(
        &self,
        filter: ProposalFilter,
        pagination: Pagination,
    ) -> Result<AdminProposalPage, AppError> {
        let proposals = self.proposals.find(&filter, pagination).await?;
        let total = self.proposals.count(&filter).await?;
        let status_breakdown = self.proposals.status_breakdown().await?;

        Ok(AdminProposalPage {
            proposals: self.with_plans(proposals).await?,
            pagination: PageInfo::new(pagination, total),
            status_breakdown,
        })
    }
}

pub fn dashboard_stats(proposals: &[Proposal]) -> DashboardStats {
    let mut stats = DashboardStats {
        total_proposals: proposals.len() as u64,
        ..DashboardStats::default()
    };

    for proposal in proposals {
        let has_policy_number = proposal
            .policy_details
            .as_ref()
            .and_then(|d| d.policy_number.as_ref())
            .is_some();

        match proposal.status {
            ProposalStatus::Submitted
            | ProposalStatus::UnderReview
            | ProposalStatus::MedicalCheckupRequired => stats.active_proposals += 1,
            ProposalStatus::DocumentsRequired => {
                stats.active_proposals += 1;
                stats.pending_documents += 1;
            }
            ProposalStatus::Approved | ProposalStatus::PolicyIssued => {
                stats.approved_policies += 1
            }
            ProposalStatus::Rejected | ProposalStatus::Cancelled => {
                if has_policy_number {
                    stats.approved_policies += 1;
                }
            }
        }
    }

    stats
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$",
        )
        .expect("email pattern is valid")
    })
}

pub fn is_valid_email(email: &str) -> bool {
    email_pattern().is_match(email.trim())
}

/// 10 to 15 digits once spaces, dashes, parentheses and a leading `+` are removed.
pub fn is_valid_phone(phone: &str) -> bool {
    let digits: String = phone
        .trim()
        .trim_start_matches('+')
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();
    (10..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
}

fn require(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        return Err(AppError::BadRequest(format!("{} is required", field)));
    }
    Ok(())
}

pub fn validate_submission(request: &SubmitProposalRequest) -> Result<(), AppError> {
    let info = &request.personal_info;
    require("personalInfo.firstName", &info.first_name)?;
    require("personalInfo.lastName", &info.last_name)?;
    require("personalInfo.address.street", &info.address.street)?;
    require("personalInfo.address.city", &info.address.city)?;
    require("personalInfo.address.state", &info.address.state)?;
    require("personalInfo.address.pincode", &info.address.pincode)?;

    if !is_valid_email(&info.email) {
        return Err(AppError::BadRequest(
            "personalInfo.email is not a valid email address".to_string(),
        ));
    }
    if !is_valid_phone(&info.phone) {
        return Err(AppError::BadRequest(
            "personalInfo.phone is not a valid phone number".to_string(),
        ));
    }

    for member in &request.family_members {
        require("familyMembers.name", &member.name)?;
        require("familyMembers.relationship", &member.relationship)?;
    }

    let zero = BigDecimal::from(0);
    let premiums = &request.premium_details;
    let amounts = [
        ("basePremium", &premiums.base_premium),
        ("addOnPremium", &premiums.add_on_premium),
        ("familyPremium", &premiums.family_premium),
        ("totalAnnualPremium", &premiums.total_annual_premium),
        ("totalMonthlyPremium", &premiums.total_monthly_premium),
    ];
    for (name, amount) in amounts {
        if *amount < zero {
            return Err(AppError::BadRequest(format!(
                "premiumDetails.{} cannot be negative",
                name
            )));
        }
    }
    for add_on in &request.selected_add_ons {
        if add_on.premium < zero {
            return Err(AppError::BadRequest(format!(
                "premium of add-on '{}' cannot be negative",
                add_on.name
            )));
        }
    }

    Ok(())
}
