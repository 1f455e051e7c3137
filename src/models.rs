use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============ Enumerations ============

/// Lifecycle status of a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Submitted,
    UnderReview,
    DocumentsRequired,
    MedicalCheckupRequired,
    Approved,
    Rejected,
    PolicyIssued,
    Cancelled,
}

impl ProposalStatus {
    pub const ALL: [ProposalStatus; 8] = [
        ProposalStatus::Submitted,
        ProposalStatus::UnderReview,
        ProposalStatus::DocumentsRequired,
        ProposalStatus::MedicalCheckupRequired,
        ProposalStatus::Approved,
        ProposalStatus::Rejected,
        ProposalStatus::PolicyIssued,
        ProposalStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Submitted => "submitted",
            ProposalStatus::UnderReview => "under_review",
            ProposalStatus::DocumentsRequired => "documents_required",
            ProposalStatus::MedicalCheckupRequired => "medical_checkup_required",
            ProposalStatus::Approved => "approved",
            ProposalStatus::Rejected => "rejected",
            ProposalStatus::PolicyIssued => "policy_issued",
            ProposalStatus::Cancelled => "cancelled",
        }
    }

    /// No transition out of these states is defined.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProposalStatus::Rejected | ProposalStatus::PolicyIssued | ProposalStatus::Cancelled
        )
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProposalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProposalStatus::ALL
            .iter()
            .find(|status| status.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Unknown proposal status '{}'", s))
    }
}

/// Kind of supporting paperwork on a proposal checklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    IdentityProof,
    AddressProof,
    AgeProof,
    IncomeProof,
    MedicalReports,
    PreviousPolicy,
    PassportPhoto,
    Other,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::IdentityProof => "identity_proof",
            DocumentType::AddressProof => "address_proof",
            DocumentType::AgeProof => "age_proof",
            DocumentType::IncomeProof => "income_proof",
            DocumentType::MedicalReports => "medical_reports",
            DocumentType::PreviousPolicy => "previous_policy",
            DocumentType::PassportPhoto => "passport_photo",
            DocumentType::Other => "other",
        }
    }
}

impl FromStr for DocumentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| format!("Unknown document type '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationType {
    Email,
    Sms,
    Call,
    Meeting,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationStatus {
    #[default]
    Sent,
    Delivered,
    Read,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanType {
    Individual,
    Family,
    #[serde(rename = "Senior Citizen")]
    SeniorCitizen,
    #[serde(rename = "Critical Illness")]
    CriticalIllness,
    Group,
}

impl PlanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::Individual => "Individual",
            PlanType::Family => "Family",
            PlanType::SeniorCitizen => "Senior Citizen",
            PlanType::CriticalIllness => "Critical Illness",
            PlanType::Group => "Group",
        }
    }
}

impl FromStr for PlanType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| format!("Unknown plan type '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    #[default]
    Active,
    Inactive,
    Discontinued,
}

// ============ Plan ============

/// Catalog entry for an insurance product. Read-only from the proposal core's
/// point of view; only `sum_insured` and `plan_type` feed document derivation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: Uuid,
    pub name: String,
    pub provider: String,
    #[serde(rename = "type")]
    pub plan_type: PlanType,
    /// Coverage amount in whole currency units.
    pub sum_insured: i64,
    #[serde(default)]
    pub status: PlanStatus,
}

// ============ Proposal ============

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub street: String,
    pub city: String,
    pub state: String,
    pub pincode: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalInfo {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    pub address: Address,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyMember {
    pub name: String,
    pub relationship: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
}

/// Medical disclosures made by the applicant.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalInfo {
    #[serde(default)]
    pub pre_existing_conditions: Vec<String>,
    pub current_medications: Option<String>,
    #[serde(default)]
    pub previous_insurance: bool,
    pub previous_insurance_details: Option<String>,
    pub preferred_hospitals: Option<String>,
    pub additional_requirements: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedAddOn {
    pub name: String,
    pub description: Option<String>,
    pub premium: BigDecimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PremiumDetails {
    pub base_premium: BigDecimal,
    #[serde(default)]
    pub add_on_premium: BigDecimal,
    #[serde(default)]
    pub family_premium: BigDecimal,
    pub total_annual_premium: BigDecimal,
    pub total_monthly_premium: BigDecimal,
}

/// One entry of the append-only status log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusHistoryEntry {
    pub status: ProposalStatus,
    pub comment: Option<String>,
    pub updated_by: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequiredDocument {
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    pub name: String,
    pub required: bool,
    pub uploaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDetails {
    pub policy_number: Option<String>,
    pub policy_start_date: Option<DateTime<Utc>>,
    pub policy_end_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_document_path: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectionDetails {
    pub reason: Option<String>,
    pub detailed_reason: Option<String>,
    pub rejected_at: DateTime<Utc>,
    pub rejected_by: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignedAgent {
    pub agent_id: String,
    pub agent_name: Option<String>,
    pub agent_email: Option<String>,
    pub agent_phone: Option<String>,
    pub assigned_at: DateTime<Utc>,
}

/// Medical examination arranged for the applicant.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalCheckup {
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub scheduled: bool,
    pub scheduled_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed: bool,
    pub completed_date: Option<DateTime<Utc>>,
    pub report_path: Option<String>,
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMode {
    Annual,
    SemiAnnual,
    Quarterly,
    Monthly,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInfo {
    pub payment_mode: Option<PaymentMode>,
    #[serde(default)]
    pub first_premium_paid: bool,
    pub first_premium_amount: Option<BigDecimal>,
    pub first_premium_date: Option<DateTime<Utc>>,
    pub payment_method: Option<String>,
    pub transaction_id: Option<String>,
}

fn default_private() -> bool {
    true
}

/// Staff-only remark on a proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalNote {
    pub note: String,
    pub added_by: String,
    pub added_at: DateTime<Utc>,
    #[serde(default = "default_private")]
    pub is_private: bool,
}

/// Outbound message log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Communication {
    #[serde(rename = "type")]
    pub channel: CommunicationType,
    pub subject: Option<String>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub sent_by: String,
    pub sent_to: Option<String>,
    #[serde(default)]
    pub status: CommunicationStatus,
}

/// A customer's application for a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub id: Uuid,
    pub proposal_number: String,
    /// Set when the number came from the timestamp fallback.
    #[serde(default)]
    pub number_degraded: bool,
    pub plan_id: Uuid,
    pub user_id: String,
    pub personal_info: PersonalInfo,
    #[serde(default)]
    pub family_members: Vec<FamilyMember>,
    #[serde(default)]
    pub medical_info: MedicalInfo,
    #[serde(default)]
    pub selected_add_ons: Vec<SelectedAddOn>,
    pub premium_details: PremiumDetails,
    pub status: ProposalStatus,
    pub status_history: Vec<StatusHistoryEntry>,
    pub required_documents: Vec<RequiredDocument>,
    pub policy_details: Option<PolicyDetails>,
    pub rejection_details: Option<RejectionDetails>,
    pub assigned_agent: Option<AssignedAgent>,
    #[serde(default)]
    pub communications: Vec<Communication>,
    #[serde(default)]
    pub medical_checkup: Option<MedicalCheckup>,
    #[serde(default)]
    pub payment_info: Option<PaymentInfo>,
    #[serde(default)]
    pub internal_notes: Vec<InternalNote>,
    pub submitted_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    /// Optimistic-concurrency counter, bumped by the store on every save.
    #[serde(default)]
    pub version: i64,
}

// ============ API Request/Response Models ============

/// Request payload for submitting a proposal.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitProposalRequest {
    pub plan_id: Uuid,
    pub personal_info: PersonalInfo,
    #[serde(default)]
    pub family_members: Vec<FamilyMember>,
    #[serde(default)]
    pub medical_info: MedicalInfo,
    #[serde(default)]
    pub selected_add_ons: Vec<SelectedAddOn>,
    pub premium_details: PremiumDetails,
}

/// Agent fields an admin may attach to a status change.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentAssignment {
    pub agent_id: String,
    pub agent_name: Option<String>,
    pub agent_email: Option<String>,
    pub agent_phone: Option<String>,
}

/// Caller-supplied rejection fields; `rejectedAt`/`rejectedBy` are stamped server-side.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectionInput {
    pub reason: Option<String>,
    pub detailed_reason: Option<String>,
}

/// Request payload for `PUT /proposals/:id/status`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateRequest {
    pub status: ProposalStatus,
    pub comment: Option<String>,
    pub assigned_agent: Option<AgentAssignment>,
    pub rejection_details: Option<RejectionInput>,
    pub policy_number: Option<String>,
}

impl StatusUpdateRequest {
    pub fn new(status: ProposalStatus) -> Self {
        Self {
            status,
            comment: None,
            assigned_agent: None,
            rejection_details: None,
            policy_number: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunicationRequest {
    #[serde(rename = "type")]
    pub channel: CommunicationType,
    pub subject: Option<String>,
    pub message: String,
    pub sent_to: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentUploadRequest {
    pub file_path: String,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
}

/// Listing filter shared by the user and admin listings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalFilter {
    pub user_id: Option<String>,
    pub status: Option<ProposalStatus>,
    pub agent_id: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    /// Case-insensitive match on number, applicant name or email.
    pub search: Option<String>,
}

impl ProposalFilter {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, proposal: &Proposal) -> bool {
        if let Some(ref user_id) = self.user_id {
            if &proposal.user_id != user_id {
                return false;
            }
        }
        if let Some(status) = self.status {
            if proposal.status != status {
                return false;
            }
        }
        if let Some(ref agent_id) = self.agent_id {
            let assigned = proposal
                .assigned_agent
                .as_ref()
                .map(|a| &a.agent_id == agent_id)
                .unwrap_or(false);
            if !assigned {
                return false;
            }
        }
        if let Some(from) = self.date_from {
            if proposal.submitted_at < from {
                return false;
            }
        }
        if let Some(to) = self.date_to {
            if proposal.submitted_at > to {
                return false;
            }
        }
        if let Some(ref term) = self.search {
            let term = term.to_lowercase();
            let info = &proposal.personal_info;
            let hit = [
                proposal.proposal_number.as_str(),
                info.first_name.as_str(),
                info.last_name.as_str(),
                info.email.as_str(),
            ]
            .iter()
            .any(|field| field.to_lowercase().contains(&term));
            if !hit {
                return false;
            }
        }
        true
    }
}

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Pagination {
    pub const MAX_LIMIT: u32 = 100;

    /// Clamps page to >= 1 and limit to 1..=MAX_LIMIT.
    pub fn new(page: Option<u32>, limit: Option<u32>, default_limit: u32) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(default_limit).clamp(1, Self::MAX_LIMIT),
        }
    }

    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.limit as u64
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub current_page: u32,
    pub total_pages: u64,
    pub total_proposals: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl PageInfo {
    pub fn new(pagination: Pagination, total: u64) -> Self {
        let limit = pagination.limit as u64;
        Self {
            current_page: pagination.page,
            total_pages: total.div_ceil(limit),
            total_proposals: total,
            has_next: pagination.page as u64 * limit < total,
            has_prev: pagination.page > 1,
        }
    }
}

/// Catalog fields shown next to a proposal in listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    pub name: String,
    pub provider: String,
    #[serde(rename = "type")]
    pub plan_type: String,
}

impl PlanSummary {
    /// Placeholder for proposals whose plan is no longer in the catalog.
    pub fn unknown() -> Self {
        Self {
            name: "Unknown Plan".to_string(),
            provider: "Unknown Provider".to_string(),
            plan_type: "Unknown Type".to_string(),
        }
    }
}

impl From<&Plan> for PlanSummary {
    fn from(plan: &Plan) -> Self {
        Self {
            name: plan.name.clone(),
            provider: plan.provider.clone(),
            plan_type: plan.plan_type.as_str().to_string(),
        }
    }
}

/// A proposal together with its plan's catalog fields.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalListItem {
    #[serde(flatten)]
    pub proposal: Proposal,
    pub plan: PlanSummary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalPage {
    pub proposals: Vec<ProposalListItem>,
    pub pagination: PageInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCount {
    pub status: ProposalStatus,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminProposalPage {
    pub proposals: Vec<ProposalListItem>,
    pub pagination: PageInfo,
    pub status_breakdown: Vec<StatusCount>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_proposals: u64,
    pub active_proposals: u64,
    pub approved_policies: u64,
    pub pending_documents: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub proposals: Vec<ProposalListItem>,
    pub stats: DashboardStats,
}

/// Response body for a successful submission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    pub proposal_number: String,
    pub proposal_id: Uuid,
    pub status: ProposalStatus,
    pub required_documents: Vec<RequiredDocument>,
}

impl From<&Proposal> for SubmissionReceipt {
    fn from(proposal: &Proposal) -> Self {
        Self {
            proposal_number: proposal.proposal_number.clone(),
            proposal_id: proposal.id,
            status: proposal.status,
            required_documents: proposal.required_documents.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_strings_round_trip() {
        for status in ProposalStatus::ALL {
            let json = serde_json::to_value(status).unwrap();
            assert_eq!(json, serde_json::json!(status.as_str()));
            assert_eq!(status.as_str().parse::<ProposalStatus>().unwrap(), status);
        }
        assert!("approved ".parse::<ProposalStatus>().is_err());
    }

    #[test]
    fn test_document_type_wire_names() {
        assert_eq!(
            "previous_policy".parse::<DocumentType>().unwrap(),
            DocumentType::PreviousPolicy
        );
        assert_eq!(DocumentType::PassportPhoto.as_str(), "passport_photo");
        assert!("selfie".parse::<DocumentType>().is_err());
    }

    #[test]
    fn test_plan_type_uses_display_names() {
        let json = serde_json::to_value(PlanType::SeniorCitizen).unwrap();
        assert_eq!(json, serde_json::json!("Senior Citizen"));
        assert_eq!(
            "Critical Illness".parse::<PlanType>().unwrap(),
            PlanType::CriticalIllness
        );
    }

    #[test]
    fn test_pagination_clamps() {
        let p = Pagination::new(Some(0), Some(1000), 10);
        assert_eq!(p.page, 1);
        assert_eq!(p.limit, Pagination::MAX_LIMIT);

        let p = Pagination::new(Some(3), None, 20);
        assert_eq!(p.offset(), 40);
    }

    #[test]
    fn test_page_info() {
        let info = PageInfo::new(Pagination::new(Some(2), Some(10), 10), 25);
        assert_eq!(info.total_pages, 3);
        assert!(info.has_next);
        assert!(info.has_prev);

        let info = PageInfo::new(Pagination::new(Some(1), Some(10), 10), 0);
        assert_eq!(info.total_pages, 0);
        assert!(!info.has_next);
        assert!(!info.has_prev);
    }
}
