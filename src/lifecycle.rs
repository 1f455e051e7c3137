//! Proposal status transitions and the mutations that accompany them.

use crate::errors::AppError;
use crate::models::{
    AssignedAgent, Communication, CommunicationRequest, CommunicationStatus, PolicyDetails,
    Proposal, ProposalStatus, RejectionDetails, StatusHistoryEntry, StatusUpdateRequest,
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::str::FromStr;

/// Fixed policy term set on approval.
pub const POLICY_TERM_DAYS: i64 = 365;

/// How strictly the status graph is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionPolicy {
    /// Only edges from [`allowed_targets`] (plus self-transitions) are accepted.
    #[default]
    Strict,
    /// Any status may follow any other.
    Permissive,
}

impl FromStr for TransitionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(TransitionPolicy::Strict),
            "permissive" => Ok(TransitionPolicy::Permissive),
            other => Err(format!(
                "LIFECYCLE_POLICY must be 'strict' or 'permissive', got '{}'",
                other
            )),
        }
    }
}

pub fn allowed_targets(from: ProposalStatus) -> &'static [ProposalStatus] {
    use ProposalStatus::*;
    match from {
        Submitted => &[
            UnderReview,
            DocumentsRequired,
            MedicalCheckupRequired,
            Approved,
            Rejected,
            Cancelled,
        ],
        UnderReview => &[
            DocumentsRequired,
            MedicalCheckupRequired,
            Approved,
            Rejected,
            Cancelled,
        ],
        DocumentsRequired => &[
            UnderReview,
            MedicalCheckupRequired,
            Approved,
            Rejected,
            Cancelled,
        ],
        MedicalCheckupRequired => &[
            UnderReview,
            DocumentsRequired,
            Approved,
            Rejected,
            Cancelled,
        ],
        Approved => &[PolicyIssued, Cancelled],
        Rejected | PolicyIssued | Cancelled => &[],
    }
}

impl TransitionPolicy {
    pub fn check(&self, from: ProposalStatus, to: ProposalStatus) -> Result<(), AppError> {
        if from == to || *self == TransitionPolicy::Permissive {
            return Ok(());
        }
        if allowed_targets(from).contains(&to) {
            Ok(())
        } else {
            Err(AppError::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            })
        }
    }
}

fn validate_extras(request: &StatusUpdateRequest) -> Result<(), AppError> {
    if let Some(ref agent) = request.assigned_agent {
        if agent.agent_id.trim().is_empty() {
            return Err(AppError::BadRequest(
                "assignedAgent.agentId cannot be empty".to_string(),
            ));
        }
    }
    // Rejection details only matter when rejecting; elsewhere they are ignored.
    let rejection = request
        .rejection_details
        .as_ref()
        .filter(|_| request.status == ProposalStatus::Rejected);
    if let Some(rejection) = rejection {
        let has_reason = rejection
            .reason
            .as_deref()
            .map(|r| !r.trim().is_empty())
            .unwrap_or(false);
        if !has_reason {
            return Err(AppError::BadRequest(
                "rejectionDetails.reason is required".to_string(),
            ));
        }
    }
    if let Some(ref number) = request.policy_number {
        if number.trim().is_empty() {
            return Err(AppError::BadRequest(
                "policyNumber cannot be empty".to_string(),
            ));
        }
    }
    Ok(())
}

/// Applies a status change to `proposal` in place.
///
/// Nothing is touched unless the edge and the extras validate. The history
/// entry is appended even when the status does not change.
pub fn apply_transition(
    proposal: &mut Proposal,
    request: &StatusUpdateRequest,
    updated_by: &str,
    now: DateTime<Utc>,
    policy: TransitionPolicy,
) -> Result<(), AppError> {
    policy.check(proposal.status, request.status)?;
    validate_extras(request)?;

    let from = proposal.status;
    let to = request.status;

    proposal.status = to;
    proposal.status_history.push(StatusHistoryEntry {
        status: to,
        comment: request.comment.clone(),
        updated_by: updated_by.to_string(),
        timestamp: now,
    });

    match to {
        ProposalStatus::Approved => {
            proposal.policy_details = Some(PolicyDetails {
                policy_number: request.policy_number.clone(),
                policy_start_date: Some(now),
                policy_end_date: Some(now + Duration::days(POLICY_TERM_DAYS)),
                policy_document_path: None,
                issued_at: None,
            });
        }
        ProposalStatus::PolicyIssued => {
            let mut details = proposal.policy_details.take().unwrap_or_default();
            if details.policy_start_date.is_none() {
                details.policy_start_date = Some(now);
                details.policy_end_date = Some(now + Duration::days(POLICY_TERM_DAYS));
            }
            if request.policy_number.is_some() {
                details.policy_number = request.policy_number.clone();
            }
            details.issued_at = Some(now);
            proposal.policy_details = Some(details);
        }
        ProposalStatus::Rejected => {
            if let Some(ref input) = request.rejection_details {
                proposal.rejection_details = Some(RejectionDetails {
                    reason: input.reason.clone(),
                    detailed_reason: input.detailed_reason.clone(),
                    rejected_at: now,
                    rejected_by: updated_by.to_string(),
                });
            }
        }
        _ => {}
    }

    if let Some(ref agent) = request.assigned_agent {
        proposal.assigned_agent = Some(AssignedAgent {
            agent_id: agent.agent_id.clone(),
            agent_name: agent.agent_name.clone(),
            agent_email: agent.agent_email.clone(),
            agent_phone: agent.agent_phone.clone(),
            assigned_at: now,
        });
    }

    proposal.last_updated_at = now;

    tracing::info!(
        "Proposal {} status {} -> {} by {}",
        proposal.proposal_number,
        from,
        to,
        updated_by
    );
    Ok(())
}

/// Appends an outbound message to the communication log.
pub fn append_communication(
    proposal: &mut Proposal,
    request: &CommunicationRequest,
    sent_by: &str,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    if request.message.trim().is_empty() {
        return Err(AppError::BadRequest("message cannot be empty".to_string()));
    }

    proposal.communications.push(Communication {
        channel: request.channel,
        subject: request.subject.clone(),
        message: request.message.clone(),
        timestamp: now,
        sent_by: sent_by.to_string(),
        sent_to: request.sent_to.clone(),
        status: CommunicationStatus::Sent,
    });
    proposal.last_updated_at = now;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::*;
    use bigdecimal::BigDecimal;
    use chrono::{NaiveDate, TimeZone};
    use uuid::Uuid;

    fn proposal() -> Proposal {
        let submitted = Utc.with_ymd_and_hms(2024, 7, 1, 9, 0, 0).unwrap();
        Proposal {
            id: Uuid::new_v4(),
            proposal_number: "HI2024070001".to_string(),
            number_degraded: false,
            plan_id: Uuid::new_v4(),
            user_id: "42".to_string(),
            personal_info: PersonalInfo {
                first_name: "Ravi".to_string(),
                last_name: "Kumar".to_string(),
                email: "ravi@example.com".to_string(),
                phone: "9123456780".to_string(),
                date_of_birth: NaiveDate::from_ymd_opt(1985, 1, 20).unwrap(),
                gender: Gender::Male,
                address: Address {
                    street: "4 Lake View".to_string(),
                    city: "Chennai".to_string(),
                    state: "TN".to_string(),
                    pincode: "600001".to_string(),
                },
            },
            family_members: vec![],
            medical_info: MedicalInfo::default(),
            selected_add_ons: vec![],
            premium_details: PremiumDetails {
                base_premium: BigDecimal::from(12000),
                add_on_premium: BigDecimal::from(0),
                family_premium: BigDecimal::from(0),
                total_annual_premium: BigDecimal::from(12000),
                total_monthly_premium: BigDecimal::from(1000),
            },
            status: ProposalStatus::Submitted,
            status_history: vec![StatusHistoryEntry {
                status: ProposalStatus::Submitted,
                comment: Some("Proposal submitted by customer".to_string()),
                updated_by: "42".to_string(),
                timestamp: submitted,
            }],
            required_documents: vec![],
            policy_details: None,
            rejection_details: None,
            assigned_agent: None,
            communications: vec![],
            medical_checkup: None,
            payment_info: None,
            internal_notes: vec![],
            submitted_at: submitted,
            last_updated_at: submitted,
            version: 0,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 20, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_approval_sets_one_year_term() {
        let mut p = proposal();
        let request = StatusUpdateRequest::new(ProposalStatus::Approved).with_comment("ok");

        apply_transition(&mut p, &request, "admin-1", now(), TransitionPolicy::Strict).unwrap();

        let details = p.policy_details.as_ref().unwrap();
        let start = details.policy_start_date.unwrap();
        assert_eq!(start, now());
        assert_eq!(details.policy_end_date.unwrap(), start + Duration::days(365));
        assert_eq!(p.status_history.len(), 2);
        assert_eq!(p.status_history[1].status, ProposalStatus::Approved);
        assert_eq!(p.status_history[1].updated_by, "admin-1");
        assert_eq!(p.last_updated_at, now());
    }

    #[test]
    fn test_rejection_stamps_details() {
        let mut p = proposal();
        let mut request = StatusUpdateRequest::new(ProposalStatus::Rejected);
        request.rejection_details = Some(RejectionInput {
            reason: Some("x".to_string()),
            detailed_reason: None,
        });

        apply_transition(&mut p, &request, "admin-7", now(), TransitionPolicy::Strict).unwrap();

        let rejection = p.rejection_details.unwrap();
        assert_eq!(rejection.reason.as_deref(), Some("x"));
        assert_eq!(rejection.rejected_at, now());
        assert_eq!(rejection.rejected_by, "admin-7");
    }

    #[test]
    fn test_rejection_without_details_leaves_them_unset() {
        let mut p = proposal();
        let request = StatusUpdateRequest::new(ProposalStatus::Rejected);
        apply_transition(&mut p, &request, "admin", now(), TransitionPolicy::Strict).unwrap();
        assert!(p.rejection_details.is_none());
    }

    #[test]
    fn test_self_transition_is_logged() {
        let mut p = proposal();
        let request = StatusUpdateRequest::new(ProposalStatus::Submitted);
        apply_transition(&mut p, &request, "admin", now(), TransitionPolicy::Strict).unwrap();
        assert_eq!(p.status, ProposalStatus::Submitted);
        assert_eq!(p.status_history.len(), 2);
    }

    #[test]
    fn test_strict_policy_rejects_leaving_terminal_state() {
        let mut p = proposal();
        p.status = ProposalStatus::PolicyIssued;
        let before = p.clone();

        let err = apply_transition(
            &mut p,
            &StatusUpdateRequest::new(ProposalStatus::Submitted),
            "admin",
            now(),
            TransitionPolicy::Strict,
        )
        .unwrap_err();

        assert!(matches!(err, AppError::InvalidTransition { .. }));
        assert_eq!(p, before);
    }

    #[test]
    fn test_permissive_policy_accepts_any_edge() {
        let mut p = proposal();
        p.status = ProposalStatus::PolicyIssued;
        apply_transition(
            &mut p,
            &StatusUpdateRequest::new(ProposalStatus::Submitted),
            "admin",
            now(),
            TransitionPolicy::Permissive,
        )
        .unwrap();
        assert_eq!(p.status, ProposalStatus::Submitted);
    }

    #[test]
    fn test_transition_table_shape() {
        for status in ProposalStatus::ALL {
            if status.is_terminal() {
                assert!(allowed_targets(status).is_empty(), "{} should be terminal", status);
            } else {
                assert!(allowed_targets(status).contains(&ProposalStatus::Cancelled));
            }
            assert!(!allowed_targets(status).contains(&ProposalStatus::Submitted));
        }
    }

    #[test]
    fn test_agent_assignment_accompanies_any_transition() {
        let mut p = proposal();
        let mut request = StatusUpdateRequest::new(ProposalStatus::UnderReview);
        request.assigned_agent = Some(AgentAssignment {
            agent_id: "agent-9".to_string(),
            agent_name: Some("Meera".to_string()),
            ..AgentAssignment::default()
        });

        apply_transition(&mut p, &request, "admin", now(), TransitionPolicy::Strict).unwrap();

        let agent = p.assigned_agent.unwrap();
        assert_eq!(agent.agent_id, "agent-9");
        assert_eq!(agent.assigned_at, now());
    }

    #[test]
    fn test_invalid_extras_leave_proposal_untouched() {
        let mut p = proposal();
        let before = p.clone();
        let mut request = StatusUpdateRequest::new(ProposalStatus::UnderReview);
        request.assigned_agent = Some(AgentAssignment::default());

        let err = apply_transition(&mut p, &request, "admin", now(), TransitionPolicy::Strict)
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert_eq!(p, before);
    }

    #[test]
    fn test_rejection_details_ignored_unless_rejecting() {
        let mut p = proposal();
        let mut request = StatusUpdateRequest::new(ProposalStatus::UnderReview);
        request.rejection_details = Some(RejectionInput::default());

        apply_transition(&mut p, &request, "admin", now(), TransitionPolicy::Strict).unwrap();
        assert_eq!(p.status, ProposalStatus::UnderReview);
        assert!(p.rejection_details.is_none());

        let mut reject = StatusUpdateRequest::new(ProposalStatus::Rejected);
        reject.rejection_details = Some(RejectionInput::default());
        let err = apply_transition(&mut p, &reject, "admin", now(), TransitionPolicy::Strict)
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert_eq!(p.status, ProposalStatus::UnderReview);
    }

    #[test]
    fn test_policy_issue_keeps_approval_term() {
        let mut p = proposal();
        apply_transition(
            &mut p,
            &StatusUpdateRequest::new(ProposalStatus::Approved),
            "admin",
            now(),
            TransitionPolicy::Strict,
        )
        .unwrap();

        let later = now() + Duration::days(3);
        let mut issue = StatusUpdateRequest::new(ProposalStatus::PolicyIssued);
        issue.policy_number = Some("POL-0001".to_string());
        apply_transition(&mut p, &issue, "admin", later, TransitionPolicy::Strict).unwrap();

        let details = p.policy_details.unwrap();
        assert_eq!(details.policy_start_date, Some(now()));
        assert_eq!(details.issued_at, Some(later));
        assert_eq!(details.policy_number.as_deref(), Some("POL-0001"));
    }

    #[test]
    fn test_communication_log_is_append_only() {
        let mut p = proposal();
        let request = CommunicationRequest {
            channel: CommunicationType::Email,
            subject: Some("Documents".to_string()),
            message: "Please upload your address proof".to_string(),
            sent_to: Some("ravi@example.com".to_string()),
        };

        append_communication(&mut p, &request, "admin", now()).unwrap();
        append_communication(&mut p, &request, "admin", now()).unwrap();

        assert_eq!(p.communications.len(), 2);
        assert_eq!(p.communications[0].status, CommunicationStatus::Sent);
        assert_eq!(p.status, ProposalStatus::Submitted);
    }
}
