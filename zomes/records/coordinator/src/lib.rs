//! Visit Records and Diagnostic Reports Coordinator Zome
//!
//! Patient-kept clinical history. Every record is private to its author:
//! reads and deletes go through an ownership check.

use careshare_shared::{
    caller, decode_entry, ensure_valid, get_owned_record, links_to_records, paginate,
    PaginatedResult, PaginationInput,
};
use hdk::prelude::*;
use records_integrity::*;

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ==================== VISIT RECORDS ====================

/// Visit form input
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct VisitRecordInput {
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
    #[serde(default)]
    pub vitals: Vitals,
    #[serde(default)]
    pub attachments: Vec<String>,
    pub visit_date: Timestamp,
    pub visit_type: VisitType,
}

impl VisitRecordInput {
    pub fn into_record(self, created_at: Timestamp) -> VisitRecord {
        VisitRecord {
            hospital_name: self.hospital_name.trim().to_string(),
            hospital_location: non_blank(self.hospital_location),
            doctor_name: self.doctor_name.trim().to_string(),
            doctor_id: non_blank(self.doctor_id),
            doctor_designation: self.doctor_designation,
            doctor_specialty: self.doctor_specialty,
            visit_shift: self.visit_shift,
            diagnosis_title: self.diagnosis_title.trim().to_string(),
            diagnosis_description: non_blank(self.diagnosis_description),
            severity: self.severity,
            affected_body_part: non_blank(self.affected_body_part),
            vitals: Vitals {
                blood_pressure: non_blank(self.vitals.blood_pressure),
                blood_sugar: non_blank(self.vitals.blood_sugar),
                heart_rate: non_blank(self.vitals.heart_rate),
                temperature: non_blank(self.vitals.temperature),
                spo2: non_blank(self.vitals.spo2),
            },
            attachments: self.attachments,
            visit_date: self.visit_date,
            visit_type: self.visit_type,
            created_at,
        }
    }
}

/// Record a clinical visit for the caller
#[hdk_extern]
pub fn create_visit_record(input: VisitRecordInput) -> ExternResult<Record> {
    let record = input.into_record(sys_time()?);
    ensure_valid(check_visit_record(&record))?;

    let record_hash = create_entry(&EntryTypes::VisitRecord(record))?;
    create_link(caller()?, record_hash.clone(), LinkTypes::AgentToVisitRecords, ())?;
    debug!("Created visit record");

    get(record_hash, GetOptions::default())?
        .ok_or(wasm_error!(WasmErrorInner::Guest("Could not find visit record".to_string())))
}

/// The caller's visit records, newest visit first
#[hdk_extern]
pub fn get_my_visit_records(pagination: Option<PaginationInput>) -> ExternResult<PaginatedResult<Record>> {
    let pagination = pagination.unwrap_or_default();
    pagination.validate()?;

    let records = my_records_newest_first(LinkTypes::AgentToVisitRecords, |record| {
        decode_entry::<VisitRecord>(record, "visit record").map(|v| v.visit_date)
    })?;
    paginate(records, &pagination)
}

/// One of the caller's visit records
#[hdk_extern]
pub fn get_visit_record(record_hash: ActionHash) -> ExternResult<Record> {
    let record = get_owned_record(record_hash, "Visit record")?;
    decode_entry::<VisitRecord>(&record, "visit record")?;
    Ok(record)
}

#[hdk_extern]
pub fn delete_visit_record(record_hash: ActionHash) -> ExternResult<ActionHash> {
    let record = get_owned_record(record_hash.clone(), "Visit record")?;
    decode_entry::<VisitRecord>(&record, "visit record")?;
    delete_owned(record_hash, LinkTypes::AgentToVisitRecords)
}

// ==================== DIAGNOSTIC REPORTS ====================

/// Report upload form input; attachments come back from the blob store
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DiagnosticReportInput {
    pub report_type: ReportType,
    pub test_name: String,
    pub collection_date: Timestamp,
    pub collection_time: Option<String>,
    pub facility_name: String,
    pub referred_by: Option<String>,
    pub attachments: Vec<String>,
    pub summary: Option<String>,
}

impl DiagnosticReportInput {
    pub fn into_report(self, created_at: Timestamp) -> DiagnosticReport {
        DiagnosticReport {
            report_type: self.report_type,
            test_name: self.test_name.trim().to_string(),
            collection_date: self.collection_date,
            collection_time: non_blank(self.collection_time),
            facility_name: self.facility_name.trim().to_string(),
            referred_by: non_blank(self.referred_by),
            attachments: self.attachments,
            summary: non_blank(self.summary),
            created_at,
        }
    }
}

#[hdk_extern]
pub fn create_diagnostic_report(input: DiagnosticReportInput) -> ExternResult<Record> {
    let report = input.into_report(sys_time()?);
    ensure_valid(check_diagnostic_report(&report))?;

    let report_hash = create_entry(&EntryTypes::DiagnosticReport(report))?;
    create_link(caller()?, report_hash.clone(), LinkTypes::AgentToDiagnosticReports, ())?;
    debug!("Created diagnostic report");

    get(report_hash, GetOptions::default())?
        .ok_or(wasm_error!(WasmErrorInner::Guest("Could not find diagnostic report".to_string())))
}

/// The caller's reports, newest collection date first
#[hdk_extern]
pub fn get_my_diagnostic_reports(
    pagination: Option<PaginationInput>,
) -> ExternResult<PaginatedResult<Record>> {
    let pagination = pagination.unwrap_or_default();
    pagination.validate()?;

    let records = my_records_newest_first(LinkTypes::AgentToDiagnosticReports, |record| {
        decode_entry::<DiagnosticReport>(record, "diagnostic report").map(|r| r.collection_date)
    })?;
    paginate(records, &pagination)
}

#[hdk_extern]
pub fn delete_diagnostic_report(report_hash: ActionHash) -> ExternResult<ActionHash> {
    let record = get_owned_record(report_hash.clone(), "Diagnostic report")?;
    decode_entry::<DiagnosticReport>(&record, "diagnostic report")?;
    delete_owned(report_hash, LinkTypes::AgentToDiagnosticReports)
}

// ==================== HELPERS ====================

fn my_records_newest_first<F>(link_type: LinkTypes, sort_key: F) -> ExternResult<Vec<Record>>
where
    F: Fn(&Record) -> ExternResult<Timestamp>,
{
    let links = get_links(LinkQuery::try_new(caller()?, link_type)?, GetStrategy::default())?;
    let mut keyed = links_to_records(links)?
        .into_iter()
        .map(|record| Ok((sort_key(&record)?, record)))
        .collect::<ExternResult<Vec<_>>>()?;
    keyed.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(keyed.into_iter().map(|(_, record)| record).collect())
}

/// Delete an entry and the caller's links pointing at it
fn delete_owned(hash: ActionHash, link_type: LinkTypes) -> ExternResult<ActionHash> {
    let deleted = delete_entry(hash.clone())?;

    let target = AnyLinkableHash::from(hash);
    let links = get_links(LinkQuery::try_new(caller()?, link_type)?, GetStrategy::default())?;
    for link in links.into_iter().filter(|link| link.target == target) {
        delete_link(link.create_link_hash, GetOptions::default())?;
    }
    debug!("Deleted record and its index links");
    Ok(deleted)
}
