//! Required-document checklist for a proposal.

use crate::errors::AppError;
use crate::models::{DocumentType, MedicalInfo, PersonalInfo, Plan, RequiredDocument};
use chrono::{DateTime, Utc};

/// Plans above this sum insured require proof of income.
pub const INCOME_PROOF_THRESHOLD: i64 = 500_000;

fn document(doc_type: DocumentType, name: &str) -> RequiredDocument {
    RequiredDocument {
        doc_type,
        name: name.to_string(),
        required: true,
        uploaded: false,
        uploaded_at: None,
        file_path: None,
        file_size: None,
        mime_type: None,
    }
}

/// Computes the checklist a proposal must supply.
///
/// Always the four baseline documents, then income proof, medical reports and
/// previous policy copy as the plan and disclosures demand, in that order.
pub fn derive_required_documents(
    _personal_info: &PersonalInfo,
    medical_info: &MedicalInfo,
    plan: &Plan,
) -> Vec<RequiredDocument> {
    let mut documents = vec![
        document(
            DocumentType::IdentityProof,
            "Identity Proof (Aadhar/PAN/Passport)",
        ),
        document(DocumentType::AddressProof, "Address Proof"),
        document(
            DocumentType::AgeProof,
            "Age Proof (Birth Certificate/10th Certificate)",
        ),
        document(DocumentType::PassportPhoto, "Passport Size Photograph"),
    ];

    if plan.sum_insured > INCOME_PROOF_THRESHOLD {
        documents.push(document(
            DocumentType::IncomeProof,
            "Income Proof (Salary Slip/ITR)",
        ));
    }

    if !medical_info.pre_existing_conditions.is_empty() {
        documents.push(document(
            DocumentType::MedicalReports,
            "Medical Reports for Pre-existing Conditions",
        ));
    }

    if medical_info.previous_insurance {
        documents.push(document(
            DocumentType::PreviousPolicy,
            "Previous Health Insurance Policy Copy",
        ));
    }

    documents
}

/// Flags an existing checklist entry as uploaded. The checklist itself is
/// frozen at creation, so an unknown type is rejected rather than appended.
pub fn mark_uploaded(
    documents: &mut [RequiredDocument],
    doc_type: DocumentType,
    file_path: String,
    file_size: Option<i64>,
    mime_type: Option<String>,
    now: DateTime<Utc>,
) -> Result<(), AppError> {
    if file_path.trim().is_empty() {
        return Err(AppError::BadRequest("filePath is required".to_string()));
    }

    let entry = documents
        .iter_mut()
        .find(|d| d.doc_type == doc_type)
        .ok_or_else(|| {
            AppError::BadRequest(format!(
                "Document '{}' is not on this proposal's checklist",
                doc_type.as_str()
            ))
        })?;

    entry.uploaded = true;
    entry.uploaded_at = Some(now);
    entry.file_path = Some(file_path);
    entry.file_size = file_size;
    entry.mime_type = mime_type;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Address, Gender, PlanStatus, PlanType};
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn personal() -> PersonalInfo {
        PersonalInfo {
            first_name: "Asha".to_string(),
            last_name: "Rao".to_string(),
            email: "asha@example.com".to_string(),
            phone: "9876543210".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1990, 4, 2).unwrap(),
            gender: Gender::Female,
            address: Address {
                street: "12 MG Road".to_string(),
                city: "Pune".to_string(),
                state: "MH".to_string(),
                pincode: "411001".to_string(),
            },
        }
    }

    fn plan(sum_insured: i64) -> Plan {
        Plan {
            id: Uuid::new_v4(),
            name: "Care Plus".to_string(),
            provider: "Acme Health".to_string(),
            plan_type: PlanType::Individual,
            sum_insured,
            status: PlanStatus::Active,
        }
    }

    fn types(docs: &[RequiredDocument]) -> Vec<DocumentType> {
        docs.iter().map(|d| d.doc_type).collect()
    }

    #[test]
    fn test_all_conditions_yield_seven_documents_in_order() {
        let medical = MedicalInfo {
            pre_existing_conditions: vec!["asthma".to_string()],
            previous_insurance: true,
            ..MedicalInfo::default()
        };

        let docs = derive_required_documents(&personal(), &medical, &plan(600_000));

        assert_eq!(
            types(&docs),
            vec![
                DocumentType::IdentityProof,
                DocumentType::AddressProof,
                DocumentType::AgeProof,
                DocumentType::PassportPhoto,
                DocumentType::IncomeProof,
                DocumentType::MedicalReports,
                DocumentType::PreviousPolicy,
            ]
        );
        assert!(docs.iter().all(|d| d.required && !d.uploaded));
    }

    #[test]
    fn test_baseline_only() {
        let docs = derive_required_documents(&personal(), &MedicalInfo::default(), &plan(300_000));
        assert_eq!(docs.len(), 4);
        assert_eq!(docs[3].doc_type, DocumentType::PassportPhoto);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let docs = derive_required_documents(&personal(), &MedicalInfo::default(), &plan(500_000));
        assert!(!types(&docs).contains(&DocumentType::IncomeProof));

        let docs = derive_required_documents(&personal(), &MedicalInfo::default(), &plan(500_001));
        assert!(types(&docs).contains(&DocumentType::IncomeProof));
    }

    #[test]
    fn test_mark_uploaded_flips_existing_entry_only() {
        let mut docs =
            derive_required_documents(&personal(), &MedicalInfo::default(), &plan(300_000));
        let now = Utc::now();

        mark_uploaded(
            &mut docs,
            DocumentType::AddressProof,
            "uploads/p1/address.pdf".to_string(),
            Some(2048),
            Some("application/pdf".to_string()),
            now,
        )
        .unwrap();

        assert_eq!(docs.len(), 4);
        let address = &docs[1];
        assert!(address.uploaded);
        assert_eq!(address.uploaded_at, Some(now));
        assert_eq!(address.file_path.as_deref(), Some("uploads/p1/address.pdf"));

        let err = mark_uploaded(
            &mut docs,
            DocumentType::IncomeProof,
            "uploads/p1/itr.pdf".to_string(),
            None,
            None,
            now,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert_eq!(docs.len(), 4);
    }
}
