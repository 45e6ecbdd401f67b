//! Share Token Integrity Zome
//!
//! Share tokens are time-boxed, scope-limited capabilities over an agent's
//! medical profile. A token is identified by the hash of the action that
//! created it. Tokens and their access logs are immutable once written.

use careshare_validation::{validate_optional_text, ValidationErrorCode, ValidationResult};
use hdi::prelude::*;
use std::fmt;
use std::str::FromStr;

const MICROS_PER_MINUTE: i64 = 60_000_000;

pub const DEFAULT_SHARE_BASE_URL: &str = "https://careshare.app/scan";
pub const MAX_USER_AGENT_LEN: usize = 512;
pub const MAX_ACCESS_LOCATION_LEN: usize = 200;

/// Category of profile data that can be granted independently
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum ShareScope {
    Allergies,
    Medications,
    Conditions,
    EmergencyContacts,
}

impl ShareScope {
    pub const ALL: [ShareScope; 4] = [
        ShareScope::Allergies,
        ShareScope::Medications,
        ShareScope::Conditions,
        ShareScope::EmergencyContacts,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShareScope::Allergies => "allergies",
            ShareScope::Medications => "medications",
            ShareScope::Conditions => "conditions",
            ShareScope::EmergencyContacts => "emergencyContacts",
        }
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|s| s.as_str()).collect()
    }

    /// Recognized scopes in first-seen order; unknown names and repeats are dropped
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Vec<ShareScope> {
        let mut scopes = Vec::with_capacity(names.len());
        for scope in names.iter().filter_map(|n| n.as_ref().trim().parse::<ShareScope>().ok()) {
            if !scopes.contains(&scope) {
                scopes.push(scope);
            }
        }
        scopes
    }
}

impl FromStr for ShareScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|scope| scope.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Unknown share scope: {}", s))
    }
}

impl fmt::Display for ShareScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How long a share link stays redeemable
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ShareLifetime {
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "24h")]
    OneDay,
}

impl ShareLifetime {
    pub const ALL: [ShareLifetime; 3] = [
        ShareLifetime::FifteenMinutes,
        ShareLifetime::OneHour,
        ShareLifetime::OneDay,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShareLifetime::FifteenMinutes => "15m",
            ShareLifetime::OneHour => "1h",
            ShareLifetime::OneDay => "24h",
        }
    }

    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|l| l.as_str()).collect()
    }

    pub fn duration_micros(&self) -> i64 {
        match self {
            ShareLifetime::FifteenMinutes => 15 * MICROS_PER_MINUTE,
            ShareLifetime::OneHour => 60 * MICROS_PER_MINUTE,
            ShareLifetime::OneDay => 24 * 60 * MICROS_PER_MINUTE,
        }
    }

    /// Lifetime whose duration is exactly `micros`
    pub fn from_span(micros: i64) -> Option<ShareLifetime> {
        Self::ALL.iter().find(|l| l.duration_micros() == micros).copied()
    }
}

impl FromStr for ShareLifetime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|lifetime| lifetime.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Unknown share lifetime: {}", s))
    }
}

/// Redeemability of a token at a point in time
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum TokenStatus {
    Active,
    Expired,
    Revoked,
}

/// Time-boxed, scope-limited read capability over the owner's profile
#[hdk_entry_helper]
#[derive(Clone, PartialEq)]
pub struct ShareToken {
    pub owner: AgentPubKey,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    pub scopes: Vec<ShareScope>,
    pub active: bool,
}

impl ShareToken {
    /// New active token expiring one `lifetime` after `now`
    pub fn issue(
        owner: AgentPubKey,
        scopes: Vec<ShareScope>,
        lifetime: ShareLifetime,
        now: Timestamp,
    ) -> Self {
        ShareToken {
            owner,
            created_at: now,
            expires_at: Timestamp::from_micros(now.as_micros().saturating_add(lifetime.duration_micros())),
            scopes,
            active: true,
        }
    }

    /// Revoked wins over expired; a token is still valid at exactly `expires_at`
    pub fn status_at(&self, now: Timestamp) -> TokenStatus {
        if !self.active {
            TokenStatus::Revoked
        } else if now > self.expires_at {
            TokenStatus::Expired
        } else {
            TokenStatus::Active
        }
    }

    pub fn is_redeemable_at(&self, now: Timestamp) -> bool {
        self.status_at(now) == TokenStatus::Active
    }

    pub fn grants(&self, scope: ShareScope) -> bool {
        self.scopes.contains(&scope)
    }

    pub fn lifetime(&self) -> Option<ShareLifetime> {
        self.expires_at
            .as_micros()
            .checked_sub(self.created_at.as_micros())
            .and_then(ShareLifetime::from_span)
    }
}

/// One redemption of a share token
#[hdk_entry_helper]
#[derive(Clone, PartialEq)]
pub struct AccessLog {
    pub token_hash: ActionHash,
    pub owner: AgentPubKey,
    pub accessor: AgentPubKey,
    pub accessed_at: Timestamp,
    pub scopes_viewed: Vec<ShareScope>,
    pub user_agent: Option<String>,
    pub access_location: Option<String>,
}

/// DNA properties consumed by the sharing zome
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ShareProperties {
    #[serde(default = "default_share_base_url")]
    pub share_base_url: String,
}

fn default_share_base_url() -> String {
    DEFAULT_SHARE_BASE_URL.to_string()
}

impl Default for ShareProperties {
    fn default() -> Self {
        Self {
            share_base_url: default_share_base_url(),
        }
    }
}

impl ShareProperties {
    /// Decode msgpack encoded DNA properties
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SerializedBytesError> {
        let owned = bytes.to_vec();
        holochain_serialized_bytes::decode(&owned)
    }

    pub fn share_url(&self, token_id: &str) -> String {
        format!("{}/{}", self.share_base_url.trim_end_matches('/'), token_id)
    }
}

#[hdk_entry_types]
#[unit_enum(UnitEntryTypes)]
pub enum EntryTypes {
    ShareToken(ShareToken),
    AccessLog(AccessLog),
}

#[hdk_link_types]
pub enum LinkTypes {
    OwnerToShareTokens,
    TokenToAccessLogs,
    OwnerToAccessLogs,
}

/// Structural checks for a freshly issued token
pub fn check_share_token(token: &ShareToken) -> ValidationResult {
    let mut result = ValidationResult::new();

    if token.scopes.is_empty() {
        result.add_error(
            "scopes",
            "Select at least one data type to share",
            ValidationErrorCode::Required,
        );
    }
    for (index, scope) in token.scopes.iter().enumerate() {
        if token.scopes[..index].contains(scope) {
            result.add_error(
                "scopes",
                &format!("Duplicate scope: {}", scope),
                ValidationErrorCode::DuplicateValue,
            );
        }
    }
    if token.lifetime().is_none() {
        result.add_error(
            "expires_in",
            &format!("Must be one of: {}", ShareLifetime::names().join(", ")),
            ValidationErrorCode::OutOfRange,
        );
    }
    if !token.active {
        result.add_error(
            "active",
            "Share tokens must be active when issued",
            ValidationErrorCode::InvalidFormat,
        );
    }
    result
}

/// Checks an access log against the token it claims to have redeemed
pub fn check_access_log(log: &AccessLog, token: &ShareToken) -> ValidationResult {
    let mut result = ValidationResult::new();

    if log.owner != token.owner {
        result.add_error("owner", "Owner does not match the share token", ValidationErrorCode::InvalidFormat);
    }
    if !token.is_redeemable_at(log.accessed_at) {
        result.add_error(
            "accessed_at",
            "Share token was not redeemable at access time",
            ValidationErrorCode::OutOfRange,
        );
    }
    if log.scopes_viewed.iter().any(|scope| !token.grants(*scope)) {
        result.add_error(
            "scopes_viewed",
            "Viewed scopes must be granted by the share token",
            ValidationErrorCode::UnknownValue,
        );
    }
    result.merge(validate_optional_text(log.user_agent.as_deref(), "user_agent", MAX_USER_AGENT_LEN));
    result.merge(validate_optional_text(
        log.access_location.as_deref(),
        "access_location",
        MAX_ACCESS_LOCATION_LEN,
    ));
    result
}

#[hdk_extern]
pub fn validate(op: Op) -> ExternResult<ValidateCallbackResult> {
    match op.flattened::<EntryTypes, LinkTypes>()? {
        FlatOp::StoreEntry(store_entry) => match store_entry {
            OpEntry::CreateEntry { app_entry, action } => match app_entry {
                EntryTypes::ShareToken(token) => validate_create_token(&token, &action.author),
                EntryTypes::AccessLog(log) => validate_create_access_log(&log, &action.author),
            },
            OpEntry::UpdateEntry { .. } => Ok(ValidateCallbackResult::Invalid(
                "Share tokens and access logs cannot be updated".to_string(),
            )),
            _ => Ok(ValidateCallbackResult::Valid),
        },
        FlatOp::StoreRecord(store_record) => match store_record {
            OpRecord::UpdateEntry { .. } => Ok(ValidateCallbackResult::Invalid(
                "Share tokens and access logs cannot be updated".to_string(),
            )),
            OpRecord::DeleteEntry { .. } => Ok(ValidateCallbackResult::Invalid(
                "Share tokens and access logs cannot be deleted".to_string(),
            )),
            _ => Ok(ValidateCallbackResult::Valid),
        },
        FlatOp::RegisterCreateLink {
            link_type,
            base_address,
            target_address,
            action,
            ..
        } => match link_type {
            LinkTypes::OwnerToShareTokens => {
                if base_address != AnyLinkableHash::from(action.author.clone()) {
                    return Ok(ValidateCallbackResult::Invalid(
                        "Share tokens must be linked from the owner's agent key".to_string(),
                    ));
                }
                Ok(ValidateCallbackResult::Valid)
            }
            LinkTypes::TokenToAccessLogs | LinkTypes::OwnerToAccessLogs => {
                validate_access_log_link(link_type, &base_address, target_address, &action.author)
            }
        },
        FlatOp::RegisterDeleteLink { .. } => Ok(ValidateCallbackResult::Invalid(
            "Share links cannot be deleted".to_string(),
        )),
        _ => Ok(ValidateCallbackResult::Valid),
    }
}

fn validate_create_token(token: &ShareToken, author: &AgentPubKey) -> ExternResult<ValidateCallbackResult> {
    if token.owner != *author {
        return Ok(ValidateCallbackResult::Invalid(
            "Share tokens can only be issued by their owner".to_string(),
        ));
    }
    Ok(to_callback_result(check_share_token(token)))
}

fn validate_create_access_log(log: &AccessLog, author: &AgentPubKey) -> ExternResult<ValidateCallbackResult> {
    if log.accessor != *author {
        return Ok(ValidateCallbackResult::Invalid(
            "Access logs must be written by the accessor".to_string(),
        ));
    }

    let record = must_get_valid_record(log.token_hash.clone())?;
    let token = match record
        .entry()
        .to_app_option::<ShareToken>()
        .map_err(|e| wasm_error!(WasmErrorInner::Guest(e.to_string())))?
    {
        Some(token) => token,
        None => {
            return Ok(ValidateCallbackResult::Invalid(
                "Access log must reference a share token".to_string(),
            ))
        }
    };

    Ok(to_callback_result(check_access_log(log, &token)))
}

/// Access log links are written by the accessor, from the token or its owner
fn validate_access_log_link(
    link_type: LinkTypes,
    base_address: &AnyLinkableHash,
    target_address: AnyLinkableHash,
    author: &AgentPubKey,
) -> ExternResult<ValidateCallbackResult> {
    let Some(log_hash) = target_address.into_action_hash() else {
        return Ok(ValidateCallbackResult::Invalid(
            "Access log links must target an access log".to_string(),
        ));
    };
    let record = must_get_valid_record(log_hash)?;
    let Some(log) = record
        .entry()
        .to_app_option::<AccessLog>()
        .map_err(|e| wasm_error!(WasmErrorInner::Guest(e.to_string())))?
    else {
        return Ok(ValidateCallbackResult::Invalid(
            "Access log links must target an access log".to_string(),
        ));
    };

    if log.accessor != *author {
        return Ok(ValidateCallbackResult::Invalid(
            "Only the accessor can link an access log".to_string(),
        ));
    }
    let expected_base = match link_type {
        LinkTypes::TokenToAccessLogs => AnyLinkableHash::from(log.token_hash),
        _ => AnyLinkableHash::from(log.owner),
    };
    if *base_address != expected_base {
        return Ok(ValidateCallbackResult::Invalid(
            "Access log link base does not match the access log".to_string(),
        ));
    }
    Ok(ValidateCallbackResult::Valid)
}

fn to_callback_result(result: ValidationResult) -> ValidateCallbackResult {
    if result.is_valid() {
        ValidateCallbackResult::Valid
    } else {
        ValidateCallbackResult::Invalid(result.summary())
    }
}
