//! User Account and Medical Profile Coordinator Zome
//!
//! Registration and profile maintenance. Another agent only ever sees a
//! profile through a redeemable share token, reduced to the token's scopes.
//! Profiles are validated field by field before anything is written to the
//! source chain.

use careshare_shared::{
    caller, decode_entry, ensure_valid, latest_linked_record, HealthError,
};
use careshare_validation::{default_display_name, parse_comma_list};
use hdk::prelude::*;
use profile_integrity::*;
use sharing_integrity::{ShareScope, ShareToken};

/// Input for registering the calling agent
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RegisterAccountInput {
    pub display_name: Option<String>,
    pub email: Option<String>,
}

/// Profile form as submitted by the client
///
/// Allergies, medications and conditions arrive comma separated.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct MedicalProfileInput {
    pub blood_type: Option<String>,
    pub allergies: Option<String>,
    pub medications: Option<String>,
    pub conditions: Option<String>,
    pub emergency_contacts: Vec<EmergencyContact>,
    pub height: Option<String>,
    pub weight: Option<String>,
}

impl MedicalProfileInput {
    pub fn into_profile(self, updated_at: Timestamp) -> MedicalProfile {
        MedicalProfile {
            blood_type: non_blank(self.blood_type),
            allergies: parse_comma_list(self.allergies.as_deref()),
            medications: parse_comma_list(self.medications.as_deref()),
            conditions: parse_comma_list(self.conditions.as_deref()),
            emergency_contacts: self
                .emergency_contacts
                .into_iter()
                .map(|c| EmergencyContact {
                    name: c.name.trim().to_string(),
                    relation: c.relation.trim().to_string(),
                    phone: c.phone.trim().to_string(),
                })
                .collect(),
            height: non_blank(self.height),
            weight: non_blank(self.weight),
            updated_at,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Register the calling agent
#[hdk_extern]
pub fn register_account(input: RegisterAccountInput) -> ExternResult<Record> {
    let agent = caller()?;
    if latest_account_record(agent.clone())?.is_some() {
        return Err(HealthError::ValidationFailure("Account is already registered".to_string()).into());
    }

    let email = non_blank(input.email);
    let account = UserAccount {
        display_name: default_display_name(input.display_name.as_deref(), email.as_deref()),
        email,
        created_at: sys_time()?,
    };
    ensure_valid(check_user_account(&account))?;

    let account_hash = create_entry(&EntryTypes::UserAccount(account))?;
    create_link(agent, account_hash.clone(), LinkTypes::AgentToAccount, ())?;
    debug!("Registered new account");

    get(account_hash, GetOptions::default())?
        .ok_or(wasm_error!(WasmErrorInner::Guest("Could not find newly created account".to_string())))
}

/// Get the calling agent's account
#[hdk_extern]
pub fn get_my_account(_: ()) -> ExternResult<Option<Record>> {
    latest_account_record(caller()?)
}

/// Public part of any agent's account; the email stays private
#[hdk_extern]
pub fn get_agent_account(agent: AgentPubKey) -> ExternResult<Option<PublicAccount>> {
    latest_account_record(agent)?
        .map(|record| decode_entry::<UserAccount>(&record, "account").map(PublicAccount::from))
        .transpose()
}

fn latest_account_record(agent: AgentPubKey) -> ExternResult<Option<Record>> {
    let links = get_links(
        LinkQuery::try_new(agent, LinkTypes::AgentToAccount)?,
        GetStrategy::default(),
    )?;
    latest_linked_record(links)
}

/// Create or replace the calling agent's medical profile
#[hdk_extern]
pub fn save_profile(input: MedicalProfileInput) -> ExternResult<Record> {
    let agent = caller()?;
    let profile = input.into_profile(sys_time()?);
    ensure_valid(check_medical_profile(&profile))?;

    let saved_hash = match latest_profile_record(agent.clone())? {
        Some(previous) => {
            let previous_hash = previous.action_address().clone();
            let updated_hash = update_entry(previous_hash.clone(), &profile)?;
            create_link(previous_hash, updated_hash.clone(), LinkTypes::ProfileUpdates, ())?;
            debug!("Updated medical profile");
            updated_hash
        }
        None => {
            let created_hash = create_entry(&EntryTypes::MedicalProfile(profile))?;
            debug!("Created medical profile");
            created_hash
        }
    };
    create_link(agent, saved_hash.clone(), LinkTypes::AgentToProfile, ())?;

    get(saved_hash, GetOptions::default())?
        .ok_or(wasm_error!(WasmErrorInner::Guest("Could not find saved profile".to_string())))
}

/// Get the calling agent's current medical profile
#[hdk_extern]
pub fn get_my_profile(_: ()) -> ExternResult<Option<MedicalProfile>> {
    latest_profile_record(caller()?)?
        .map(|record| decode_entry::<MedicalProfile>(&record, "profile"))
        .transpose()
}

/// Profile behind a share token, holding only what the token grants
///
/// Refused unless the token is redeemable right now. The sharing zome calls
/// this while redeeming a link.
#[hdk_extern]
pub fn get_shared_profile(token_hash: ActionHash) -> ExternResult<Option<MedicalProfile>> {
    let token = get(token_hash, GetOptions::default())?
        .and_then(|record| share_token_in(&record))
        .ok_or_else(|| HealthError::NotFound("Share token not found".to_string()))?;
    check_shareable(&token, sys_time()?)?;

    let Some(record) = latest_profile_record(token.owner.clone())? else {
        return Ok(None);
    };
    let profile = decode_entry::<MedicalProfile>(&record, "profile")?;
    Ok(Some(redact_to_scopes(profile, &token.scopes)))
}

/// The token stored in `record`, if it is one and was written by its owner
fn share_token_in(record: &Record) -> Option<ShareToken> {
    let token = record.entry().to_app_option::<ShareToken>().ok().flatten()?;
    (record.action().author() == &token.owner).then_some(token)
}

pub fn check_shareable(token: &ShareToken, now: Timestamp) -> Result<(), HealthError> {
    if token.is_redeemable_at(now) {
        Ok(())
    } else {
        Err(HealthError::Expired("Share token is no longer redeemable".to_string()))
    }
}

fn granted<T>(scopes: &[ShareScope], scope: ShareScope, items: Vec<T>) -> Vec<T> {
    if scopes.contains(&scope) {
        items
    } else {
        Vec::new()
    }
}

/// Copy of `profile` with every field outside `scopes` emptied
///
/// Blood type, height and weight belong to no scope and are always dropped.
pub fn redact_to_scopes(profile: MedicalProfile, scopes: &[ShareScope]) -> MedicalProfile {
    MedicalProfile {
        blood_type: None,
        allergies: granted(scopes, ShareScope::Allergies, profile.allergies),
        medications: granted(scopes, ShareScope::Medications, profile.medications),
        conditions: granted(scopes, ShareScope::Conditions, profile.conditions),
        emergency_contacts: granted(scopes, ShareScope::EmergencyContacts, profile.emergency_contacts),
        height: None,
        weight: None,
        updated_at: profile.updated_at,
    }
}

fn latest_profile_record(agent: AgentPubKey) -> ExternResult<Option<Record>> {
    let links = get_links(
        LinkQuery::try_new(agent, LinkTypes::AgentToProfile)?,
        GetStrategy::default(),
    )?;
    latest_linked_record(links)
}
