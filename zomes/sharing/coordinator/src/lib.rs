//! Share Token Coordinator Zome
//!
//! Issues time-limited, scope-restricted share links over the caller's
//! medical profile and redeems them for anyone holding the link. Token ids
//! are bearer capabilities, so logs only ever carry their fingerprint.

use careshare_shared::{
    action_fingerprint, call_local, caller, decode_entry, ensure_valid, get_owned_record,
    links_to_records, paginate, HealthError, PaginatedResult, PaginationInput,
    ValidationErrorCode, ValidationResult,
};
use careshare_validation::validate_choice;
use hdk::prelude::*;
use holo_hash::ActionHashB64;
use profile_integrity::{EmergencyContact, MedicalProfile, PublicAccount};
use sharing_integrity::*;

// ==================== SCOPED PROFILE ====================

/// Profile projection holding only granted fields
///
/// `None` means "not shared"; `Some(vec![])` means shared but empty.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ScopedProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allergies: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medications: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_contacts: Option<Vec<EmergencyContact>>,
}

impl ScopedProfile {
    pub fn from_profile(profile: &MedicalProfile, scopes: &[ShareScope]) -> Self {
        let granted = |scope: ShareScope| scopes.contains(&scope);
        ScopedProfile {
            allergies: granted(ShareScope::Allergies).then(|| profile.allergies.clone()),
            medications: granted(ShareScope::Medications).then(|| profile.medications.clone()),
            conditions: granted(ShareScope::Conditions).then(|| profile.conditions.clone()),
            emergency_contacts: granted(ShareScope::EmergencyContacts)
                .then(|| profile.emergency_contacts.clone()),
        }
    }

    /// Narrow an existing projection; never widens it
    pub fn restrict(&self, scopes: &[ShareScope]) -> Self {
        let granted = |scope: ShareScope| scopes.contains(&scope);
        ScopedProfile {
            allergies: self.allergies.clone().filter(|_| granted(ShareScope::Allergies)),
            medications: self.medications.clone().filter(|_| granted(ShareScope::Medications)),
            conditions: self.conditions.clone().filter(|_| granted(ShareScope::Conditions)),
            emergency_contacts: self
                .emergency_contacts
                .clone()
                .filter(|_| granted(ShareScope::EmergencyContacts)),
        }
    }

    /// Scopes present in this projection
    pub fn granted_scopes(&self) -> Vec<ShareScope> {
        ShareScope::ALL
            .into_iter()
            .filter(|scope| match scope {
                ShareScope::Allergies => self.allergies.is_some(),
                ShareScope::Medications => self.medications.is_some(),
                ShareScope::Conditions => self.conditions.is_some(),
                ShareScope::EmergencyContacts => self.emergency_contacts.is_some(),
            })
            .collect()
    }
}

// ==================== TOKEN IDS ====================

/// Public token id: the base64 form of the token's create action hash
pub fn token_id(token_hash: &ActionHash) -> String {
    ActionHashB64::from(token_hash.clone()).to_string()
}

/// Resolve a bare token id or a share URL to the token hash
///
/// The last path segment of a URL is used; query and fragment are ignored.
pub fn token_id_from_reference(reference: &str) -> Option<ActionHash> {
    let path = reference.trim().split(['?', '#']).next()?;
    let segment = path.trim_end_matches('/').rsplit('/').next()?;
    if segment.is_empty() {
        return None;
    }
    ActionHashB64::from_b64_str(segment).ok().map(ActionHash::from)
}

fn share_properties() -> ShareProperties {
    match dna_info() {
        Ok(info) => match ShareProperties::from_bytes(info.modifiers.properties.bytes()) {
            Ok(properties) => properties,
            Err(e) => {
                warn!("Using default share properties, could not decode DNA properties: {:?}", e);
                ShareProperties::default()
            }
        },
        Err(e) => {
            warn!("Using default share properties, DNA info unavailable: {:?}", e);
            ShareProperties::default()
        }
    }
}

// ==================== ISSUANCE ====================

/// Share form input
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct IssueShareInput {
    pub scopes: Vec<String>,
    pub expires_in: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct IssuedShare {
    pub token_id: String,
    pub token_hash: ActionHash,
    pub share_url: String,
    pub token: ShareToken,
}

/// Per-field checks on the share form; duplicates are allowed and collapse later
pub fn check_issue_input(input: &IssueShareInput) -> ValidationResult {
    let mut result = ValidationResult::new();

    if input.scopes.is_empty() {
        result.add_error(
            "scopes",
            "Select at least one data type to share",
            ValidationErrorCode::Required,
        );
    }
    let known_scopes = ShareScope::names();
    for name in &input.scopes {
        result.merge(validate_choice(name.trim(), &known_scopes, "scopes"));
    }
    result.merge(validate_choice(
        input.expires_in.trim(),
        &ShareLifetime::names(),
        "expires_in",
    ));
    result
}

/// Issue a share token over the caller's profile
#[hdk_extern]
pub fn issue_share_token(input: IssueShareInput) -> ExternResult<IssuedShare> {
    ensure_valid(check_issue_input(&input))?;
    let lifetime: ShareLifetime = input
        .expires_in
        .trim()
        .parse()
        .map_err(HealthError::ValidationFailure)?;
    let scopes = ShareScope::from_names(&input.scopes);

    let owner = caller()?;
    let token = ShareToken::issue(owner.clone(), scopes, lifetime, sys_time()?);

    let token_hash = create_entry(&EntryTypes::ShareToken(token.clone())).map_err(HealthError::upstream)?;
    create_link(owner, token_hash.clone(), LinkTypes::OwnerToShareTokens, ())
        .map_err(HealthError::upstream)?;

    info!(
        "Issued share token {} with {} scope(s) for {}",
        action_fingerprint(&token_hash),
        token.scopes.len(),
        lifetime.as_str()
    );

    let token_id = token_id(&token_hash);
    Ok(IssuedShare {
        share_url: share_properties().share_url(&token_id),
        token_id,
        token_hash,
        token,
    })
}

// ==================== REDEMPTION ====================

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RedeemShareInput {
    /// Bare token id or the full share URL
    pub token: String,
    pub user_agent: Option<String>,
    pub access_location: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RedeemedShare {
    pub token_id: String,
    pub patient_name: String,
    pub scopes: Vec<ShareScope>,
    pub expires_at: Timestamp,
    pub profile: ScopedProfile,
}

/// Why a redemption was refused
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RedemptionFailure {
    NotFound,
    Expired,
    Revoked,
    ProfileMissing,
}

impl RedemptionFailure {
    /// Message shown to whoever scanned the link; revoked and expired look the same
    pub fn reason(&self) -> &'static str {
        match self {
            RedemptionFailure::NotFound => "Invalid or expired access code.",
            RedemptionFailure::Expired | RedemptionFailure::Revoked => "This access code has expired.",
            RedemptionFailure::ProfileMissing => "User profile not found.",
        }
    }

    pub fn into_error(self) -> HealthError {
        let cause = match self {
            RedemptionFailure::NotFound | RedemptionFailure::ProfileMissing => {
                HealthError::NotFound(self.reason().to_string())
            }
            RedemptionFailure::Expired | RedemptionFailure::Revoked => {
                HealthError::Expired(self.reason().to_string())
            }
        };
        HealthError::access_denied(cause.to_string())
    }
}

impl From<RedemptionFailure> for WasmError {
    fn from(failure: RedemptionFailure) -> Self {
        failure.into_error().into()
    }
}

pub fn check_redeemable(token: &ShareToken, now: Timestamp) -> Result<(), RedemptionFailure> {
    match token.status_at(now) {
        TokenStatus::Active => Ok(()),
        TokenStatus::Expired => Err(RedemptionFailure::Expired),
        TokenStatus::Revoked => Err(RedemptionFailure::Revoked),
    }
}

fn denied_upstream(err: WasmError) -> WasmError {
    HealthError::access_denied(HealthError::upstream(err).to_string()).into()
}

fn load_token(token_hash: &ActionHash) -> ExternResult<Option<ShareToken>> {
    let Some(record) = get(token_hash.clone(), GetOptions::default()).map_err(denied_upstream)? else {
        return Ok(None);
    };
    Ok(record.entry().to_app_option::<ShareToken>().ok().flatten())
}

/// Redeem a share link and return the owner's profile filtered to its scopes
///
/// Each successful redemption writes its own access log.
#[hdk_extern]
pub fn redeem_share_token(input: RedeemShareInput) -> ExternResult<RedeemedShare> {
    let Some(token_hash) = token_id_from_reference(&input.token) else {
        debug!("Rejected malformed share reference");
        return Err(RedemptionFailure::NotFound.into());
    };
    let fingerprint = action_fingerprint(&token_hash);

    let Some(token) = load_token(&token_hash)? else {
        info!("Share token {} not found", fingerprint);
        return Err(RedemptionFailure::NotFound.into());
    };

    let now = sys_time()?;
    if let Err(failure) = check_redeemable(&token, now) {
        info!("Share token {} refused: {:?}", fingerprint, failure);
        return Err(failure.into());
    }

    let profile: Option<MedicalProfile> =
        call_local("profile", "get_shared_profile", token_hash.clone()).map_err(denied_upstream)?;
    let Some(profile) = profile else {
        info!("Share token {} has no profile behind it", fingerprint);
        return Err(RedemptionFailure::ProfileMissing.into());
    };

    let patient_name = call_local::<_, Option<PublicAccount>>("profile", "get_agent_account", token.owner.clone())
        .ok()
        .flatten()
        .map(|account| account.display_name)
        .unwrap_or_else(|| "Unknown".to_string());

    if let Err(e) = record_access(&token_hash, &token, now, input.user_agent, input.access_location) {
        warn!("Could not record access for share token {}: {:?}", fingerprint, e);
    }
    info!("Share token {} redeemed", fingerprint);

    Ok(RedeemedShare {
        token_id: token_id(&token_hash),
        patient_name,
        profile: ScopedProfile::from_profile(&profile, &token.scopes),
        scopes: token.scopes,
        expires_at: token.expires_at,
    })
}

fn clip(value: Option<String>, max: usize) -> Option<String> {
    value
        .map(|v| v.trim().chars().take(max).collect::<String>())
        .filter(|v| !v.is_empty())
}

fn record_access(
    token_hash: &ActionHash,
    token: &ShareToken,
    now: Timestamp,
    user_agent: Option<String>,
    access_location: Option<String>,
) -> ExternResult<ActionHash> {
    let log = AccessLog {
        token_hash: token_hash.clone(),
        owner: token.owner.clone(),
        accessor: caller()?,
        accessed_at: now,
        scopes_viewed: token.scopes.clone(),
        user_agent: clip(user_agent, MAX_USER_AGENT_LEN),
        access_location: clip(access_location, MAX_ACCESS_LOCATION_LEN),
    };
    ensure_valid(check_access_log(&log, token))?;

    let log_hash = create_entry(&EntryTypes::AccessLog(log))?;
    create_link(token_hash.clone(), log_hash.clone(), LinkTypes::TokenToAccessLogs, ())?;
    create_link(token.owner.clone(), log_hash.clone(), LinkTypes::OwnerToAccessLogs, ())?;
    Ok(log_hash)
}

// ==================== TOKEN MANAGEMENT ====================

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ShareTokenSummary {
    pub token_id: String,
    pub token_hash: ActionHash,
    pub share_url: String,
    pub scopes: Vec<ShareScope>,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    pub status: TokenStatus,
}

impl ShareTokenSummary {
    pub fn new(token_hash: ActionHash, token: ShareToken, properties: &ShareProperties, now: Timestamp) -> Self {
        let token_id = token_id(&token_hash);
        ShareTokenSummary {
            share_url: properties.share_url(&token_id),
            status: token.status_at(now),
            token_id,
            token_hash,
            scopes: token.scopes,
            created_at: token.created_at,
            expires_at: token.expires_at,
        }
    }
}

/// Share tokens issued by the caller, newest first
#[hdk_extern]
pub fn get_my_share_tokens(_: ()) -> ExternResult<Vec<ShareTokenSummary>> {
    let links = get_links(
        LinkQuery::try_new(caller()?, LinkTypes::OwnerToShareTokens)?,
        GetStrategy::default(),
    )?;
    let properties = share_properties();
    let now = sys_time()?;

    let mut summaries = links_to_records(links)?
        .into_iter()
        .map(|record| {
            let token = decode_entry::<ShareToken>(&record, "share token")?;
            Ok(ShareTokenSummary::new(record.action_address().clone(), token, &properties, now))
        })
        .collect::<ExternResult<Vec<_>>>()?;
    summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(summaries)
}

fn token_not_found() -> HealthError {
    HealthError::NotFound("Share token not found".to_string())
}

/// The share token stored in `entry`; any other entry reads as not found
pub fn share_token_entry(entry: Option<&Entry>) -> Result<ShareToken, HealthError> {
    entry
        .and_then(|entry| ShareToken::try_from(entry).ok())
        .ok_or_else(token_not_found)
}

fn get_my_token(reference: &str) -> ExternResult<(ActionHash, ShareToken)> {
    let token_hash = token_id_from_reference(reference).ok_or_else(token_not_found)?;
    let record = get_owned_record(token_hash.clone(), "Share token")?;
    Ok((token_hash, share_token_entry(record.entry().as_option())?))
}

/// Status of one of the caller's tokens
#[hdk_extern]
pub fn get_share_token_status(token: String) -> ExternResult<TokenStatus> {
    let (_, token) = get_my_token(&token)?;
    Ok(token.status_at(sys_time()?))
}

// ==================== ACCESS HISTORY ====================

fn logs_newest_first(links: Vec<Link>) -> ExternResult<Vec<AccessLog>> {
    let mut logs = links_to_records(links)?
        .iter()
        .map(|record| decode_entry::<AccessLog>(record, "access log"))
        .collect::<ExternResult<Vec<_>>>()?;
    logs.sort_by(|a, b| b.accessed_at.cmp(&a.accessed_at));
    Ok(logs)
}

/// Redemptions of any of the caller's tokens, newest first
#[hdk_extern]
pub fn get_my_access_history(pagination: Option<PaginationInput>) -> ExternResult<PaginatedResult<AccessLog>> {
    let pagination = pagination.unwrap_or_default();
    pagination.validate()?;

    let links = get_links(
        LinkQuery::try_new(caller()?, LinkTypes::OwnerToAccessLogs)?,
        GetStrategy::default(),
    )?;
    paginate(logs_newest_first(links)?, &pagination)
}

/// Redemptions of one of the caller's tokens, newest first
#[hdk_extern]
pub fn get_token_access_logs(token: String) -> ExternResult<Vec<AccessLog>> {
    let (token_hash, _) = get_my_token(&token)?;
    let links = get_links(
        LinkQuery::try_new(token_hash, LinkTypes::TokenToAccessLogs)?,
        GetStrategy::default(),
    )?;
    logs_newest_first(links)
}
