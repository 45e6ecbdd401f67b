//! Visit Records and Diagnostic Reports Integrity Zome
//!
//! Clinical visits and diagnostic report metadata kept by the patient.
//! Attachments are references into an external blob store. Records are
//! never edited; the author may delete them.

use careshare_validation::{
    validate_attachments, validate_optional_text, validate_required, validate_time_of_day,
    ValidationResult, MAX_LONG_TEXT, MAX_SHORT_TEXT,
};
use hdi::prelude::*;

const MAX_VITAL_LEN: usize = 32;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum DoctorDesignation {
    #[serde(rename = "Senior Consultant")]
    SeniorConsultant,
    Surgeon,
    Resident,
    #[serde(rename = "Junior Dr")]
    JuniorDoctor,
    Nurse,
    Other,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum DoctorSpecialty {
    Cardiology,
    Gastroenterology,
    Gynecology,
    Orthopedics,
    Neurology,
    General,
    Dermatology,
    Pediatrics,
    Other,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum VisitShift {
    Day,
    Night,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum VisitType {
    Visit,
    Surgery,
    Referral,
    #[serde(rename = "Follow-up")]
    FollowUp,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum ReportType {
    #[serde(rename = "Blood Test")]
    BloodTest,
    #[serde(rename = "X-Ray")]
    XRay,
    #[serde(rename = "MRI")]
    Mri,
    #[serde(rename = "CT Scan")]
    CtScan,
    Urine,
    Biopsy,
    Ultrasound,
    Other,
}

/// Vital signs as written down at the visit
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Vitals {
    pub blood_pressure: Option<String>,
    pub blood_sugar: Option<String>,
    pub heart_rate: Option<String>,
    pub temperature: Option<String>,
    pub spo2: Option<String>,
}

/// Clinical visit kept by the patient
#[hdk_entry_helper]
#[derive(Clone, PartialEq)]
pub struct VisitRecord {
    pub hospital_name: String,
    pub hospital_location: Option<String>,
    pub doctor_name: String,
    pub doctor_id: Option<String>,
    pub doctor_designation: DoctorDesignation,
    pub doctor_specialty: DoctorSpecialty,
    pub visit_shift: VisitShift,
    pub diagnosis_title: String,
    pub diagnosis_description: Option<String>,
    pub severity: Severity,
    pub affected_body_part: Option<String>,
    pub vitals: Vitals,
    /// Blob store references
    pub attachments: Vec<String>,
    pub visit_date: Timestamp,
    pub visit_type: VisitType,
    pub created_at: Timestamp,
}

/// Diagnostic report metadata; the report itself lives in the blob store
#[hdk_entry_helper]
#[derive(Clone, PartialEq)]
pub struct DiagnosticReport {
    pub report_type: ReportType,
    pub test_name: String,
    pub collection_date: Timestamp,
    /// HH:MM
    pub collection_time: Option<String>,
    pub facility_name: String,
    pub referred_by: Option<String>,
    pub attachments: Vec<String>,
    pub summary: Option<String>,
    pub created_at: Timestamp,
}

#[hdk_entry_types]
#[unit_enum(UnitEntryTypes)]
pub enum EntryTypes {
    VisitRecord(VisitRecord),
    DiagnosticReport(DiagnosticReport),
}

#[hdk_link_types]
pub enum LinkTypes {
    AgentToVisitRecords,
    AgentToDiagnosticReports,
}

pub fn check_vitals(vitals: &Vitals) -> ValidationResult {
    let mut result = ValidationResult::new();
    for (field, value) in [
        ("vitals.blood_pressure", &vitals.blood_pressure),
        ("vitals.blood_sugar", &vitals.blood_sugar),
        ("vitals.heart_rate", &vitals.heart_rate),
        ("vitals.temperature", &vitals.temperature),
        ("vitals.spo2", &vitals.spo2),
    ] {
        result.merge(validate_optional_text(value.as_deref(), field, MAX_VITAL_LEN));
    }
    result
}

pub fn check_visit_record(record: &VisitRecord) -> ValidationResult {
    let mut result = ValidationResult::new();

    result.merge(validate_required(&record.hospital_name, "hospital_name", "Hospital name"));
    result.merge(validate_required(&record.doctor_name, "doctor_name", "Doctor name"));
    result.merge(validate_required(
        &record.diagnosis_title,
        "diagnosis_title",
        "Diagnosis title",
    ));
    result.merge(validate_optional_text(
        record.hospital_location.as_deref(),
        "hospital_location",
        MAX_SHORT_TEXT,
    ));
    result.merge(validate_optional_text(record.doctor_id.as_deref(), "doctor_id", MAX_SHORT_TEXT));
    result.merge(validate_optional_text(
        record.diagnosis_description.as_deref(),
        "diagnosis_description",
        MAX_LONG_TEXT,
    ));
    result.merge(validate_optional_text(
        record.affected_body_part.as_deref(),
        "affected_body_part",
        MAX_SHORT_TEXT,
    ));
    result.merge(check_vitals(&record.vitals));
    result.merge(validate_attachments(&record.attachments, "attachments", 0));

    result
}

pub fn check_diagnostic_report(report: &DiagnosticReport) -> ValidationResult {
    let mut result = ValidationResult::new();

    result.merge(validate_required(&report.test_name, "test_name", "Test name"));
    result.merge(validate_required(&report.facility_name, "facility_name", "Facility name"));
    if let Some(time) = &report.collection_time {
        result.merge(validate_time_of_day(time, "collection_time"));
    }
    result.merge(validate_optional_text(report.referred_by.as_deref(), "referred_by", MAX_SHORT_TEXT));
    result.merge(validate_optional_text(report.summary.as_deref(), "summary", MAX_LONG_TEXT));
    result.merge(validate_attachments(&report.attachments, "attachments", 1));

    result
}

#[hdk_extern]
pub fn validate(op: Op) -> ExternResult<ValidateCallbackResult> {
    match op.flattened::<EntryTypes, LinkTypes>()? {
        FlatOp::StoreEntry(store_entry) => match store_entry {
            OpEntry::CreateEntry { app_entry, .. } => Ok(to_callback_result(match &app_entry {
                EntryTypes::VisitRecord(record) => check_visit_record(record),
                EntryTypes::DiagnosticReport(report) => check_diagnostic_report(report),
            })),
            OpEntry::UpdateEntry { .. } => Ok(ValidateCallbackResult::Invalid(
                "Visit records and reports cannot be edited".to_string(),
            )),
            _ => Ok(ValidateCallbackResult::Valid),
        },
        FlatOp::StoreRecord(store_record) => match store_record {
            OpRecord::UpdateEntry { .. } => Ok(ValidateCallbackResult::Invalid(
                "Visit records and reports cannot be edited".to_string(),
            )),
            OpRecord::DeleteEntry {
                original_action_hash,
                action,
                ..
            } => {
                let original = must_get_valid_record(original_action_hash)?;
                if *original.action().author() != action.author {
                    return Ok(ValidateCallbackResult::Invalid(
                        "Only the author can delete a record".to_string(),
                    ));
                }
                Ok(ValidateCallbackResult::Valid)
            }
            _ => Ok(ValidateCallbackResult::Valid),
        },
        FlatOp::RegisterCreateLink {
            base_address,
            action,
            ..
        } => {
            if base_address != AnyLinkableHash::from(action.author.clone()) {
                return Ok(ValidateCallbackResult::Invalid(
                    "Record links must originate from the author's agent key".to_string(),
                ));
            }
            Ok(ValidateCallbackResult::Valid)
        }
        FlatOp::RegisterDeleteLink {
            original_action,
            action,
            ..
        } => {
            if original_action.author != action.author {
                return Ok(ValidateCallbackResult::Invalid(
                    "Only the link author can delete a record link".to_string(),
                ));
            }
            Ok(ValidateCallbackResult::Valid)
        }
        _ => Ok(ValidateCallbackResult::Valid),
    }
}

fn to_callback_result(result: ValidationResult) -> ValidateCallbackResult {
    if result.is_valid() {
        ValidateCallbackResult::Valid
    } else {
        ValidateCallbackResult::Invalid(result.summary())
    }
}
