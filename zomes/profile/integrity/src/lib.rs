//! User Account and Medical Profile Integrity Zome
//!
//! Defines the per-agent account and the medical profile that share
//! tokens expose in filtered form. Both entries belong to the agent that
//! authored them; only that agent may update or delete them.

use careshare_validation::{
    validate_email, validate_optional_text, validate_phone, validate_required,
    validate_text_list, ValidationErrorCode, ValidationResult,
};
use hdi::prelude::*;

pub const MAX_EMERGENCY_CONTACTS: usize = 10;

/// Account of a registered user, keyed by the author's agent key
#[hdk_entry_helper]
#[derive(Clone, PartialEq)]
pub struct UserAccount {
    pub display_name: String,
    pub email: Option<String>,
    pub created_at: Timestamp,
}

/// Person to call in an emergency
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EmergencyContact {
    pub name: String,
    pub relation: String,
    pub phone: String,
}

/// Medical profile, one per agent
#[hdk_entry_helper]
#[derive(Clone, PartialEq)]
pub struct MedicalProfile {
    pub blood_type: Option<String>,
    pub allergies: Vec<String>,
    pub medications: Vec<String>,
    pub conditions: Vec<String>,
    pub emergency_contacts: Vec<EmergencyContact>,
    pub height: Option<String>,
    pub weight: Option<String>,
    pub updated_at: Timestamp,
}

/// What other agents may see of an account
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PublicAccount {
    pub display_name: String,
    pub created_at: Timestamp,
}

impl From<UserAccount> for PublicAccount {
    fn from(account: UserAccount) -> Self {
        PublicAccount {
            display_name: account.display_name,
            created_at: account.created_at,
        }
    }
}

#[hdk_entry_types]
#[unit_enum(UnitEntryTypes)]
pub enum EntryTypes {
    UserAccount(UserAccount),
    MedicalProfile(MedicalProfile),
}

#[hdk_link_types]
pub enum LinkTypes {
    AgentToAccount,
    AgentToProfile,
    ProfileUpdates,
}

/// Field checks for an account
pub fn check_user_account(account: &UserAccount) -> ValidationResult {
    let mut result = validate_required(&account.display_name, "display_name", "Display name");
    if let Some(email) = &account.email {
        result.merge(validate_email(email, "email"));
    }
    result
}

/// Field checks for a single emergency contact
pub fn check_emergency_contact(contact: &EmergencyContact, index: usize) -> ValidationResult {
    let mut result = ValidationResult::new();
    result.merge(validate_required(
        &contact.name,
        &format!("emergency_contacts[{}].name", index),
        "Name",
    ));
    result.merge(validate_required(
        &contact.relation,
        &format!("emergency_contacts[{}].relation", index),
        "Relation",
    ));
    result.merge(validate_phone(
        &contact.phone,
        &format!("emergency_contacts[{}].phone", index),
    ));
    result
}

/// Field checks for a medical profile
pub fn check_medical_profile(profile: &MedicalProfile) -> ValidationResult {
    let mut result = ValidationResult::new();

    result.merge(validate_optional_text(profile.blood_type.as_deref(), "blood_type", 16));
    result.merge(validate_optional_text(profile.height.as_deref(), "height", 32));
    result.merge(validate_optional_text(profile.weight.as_deref(), "weight", 32));
    result.merge(validate_text_list(&profile.allergies, "allergies"));
    result.merge(validate_text_list(&profile.medications, "medications"));
    result.merge(validate_text_list(&profile.conditions, "conditions"));

    if profile.emergency_contacts.is_empty() {
        result.add_error(
            "emergency_contacts",
            "At least one emergency contact is required",
            ValidationErrorCode::Required,
        );
    }
    if profile.emergency_contacts.len() > MAX_EMERGENCY_CONTACTS {
        result.add_error(
            "emergency_contacts",
            &format!("At most {} emergency contacts allowed", MAX_EMERGENCY_CONTACTS),
            ValidationErrorCode::OutOfRange,
        );
    }
    for (index, contact) in profile.emergency_contacts.iter().enumerate() {
        result.merge(check_emergency_contact(contact, index));
    }

    result
}

#[hdk_extern]
pub fn validate(op: Op) -> ExternResult<ValidateCallbackResult> {
    match op.flattened::<EntryTypes, LinkTypes>()? {
        FlatOp::StoreEntry(store_entry) => match store_entry {
            OpEntry::CreateEntry { app_entry, .. } | OpEntry::UpdateEntry { app_entry, .. } => {
                validate_entry(app_entry)
            }
            _ => Ok(ValidateCallbackResult::Valid),
        },
        FlatOp::StoreRecord(store_record) => match store_record {
            OpRecord::UpdateEntry {
                original_action_hash,
                action,
                ..
            } => validate_same_author(original_action_hash, &action.author),
            OpRecord::DeleteEntry {
                original_action_hash,
                action,
                ..
            } => validate_same_author(original_action_hash, &action.author),
            _ => Ok(ValidateCallbackResult::Valid),
        },
        FlatOp::RegisterCreateLink {
            link_type,
            base_address,
            target_address,
            action,
            ..
        } => match link_type {
            LinkTypes::AgentToAccount | LinkTypes::AgentToProfile => {
                if let invalid @ ValidateCallbackResult::Invalid(_) =
                    validate_agent_base(&base_address, &action.author)?
                {
                    return Ok(invalid);
                }
                validate_agent_link_target(&link_type, target_address, &action.author)
            }
            LinkTypes::ProfileUpdates => Ok(ValidateCallbackResult::Valid),
        },
        FlatOp::RegisterDeleteLink {
            original_action,
            action,
            ..
        } => {
            if original_action.author != action.author {
                return Ok(ValidateCallbackResult::Invalid(
                    "Only the link author can delete a profile link".to_string(),
                ));
            }
            Ok(ValidateCallbackResult::Valid)
        }
        _ => Ok(ValidateCallbackResult::Valid),
    }
}

fn validate_entry(app_entry: EntryTypes) -> ExternResult<ValidateCallbackResult> {
    let result = match &app_entry {
        EntryTypes::UserAccount(account) => check_user_account(account),
        EntryTypes::MedicalProfile(profile) => check_medical_profile(profile),
    };
    Ok(to_callback_result(result))
}

fn validate_same_author(
    original_action_hash: ActionHash,
    author: &AgentPubKey,
) -> ExternResult<ValidateCallbackResult> {
    let original = must_get_valid_record(original_action_hash)?;
    if original.action().author() != author {
        return Ok(ValidateCallbackResult::Invalid(
            "Only the owner can modify their account or profile".to_string(),
        ));
    }
    Ok(ValidateCallbackResult::Valid)
}

fn validate_agent_base(
    base_address: &AnyLinkableHash,
    author: &AgentPubKey,
) -> ExternResult<ValidateCallbackResult> {
    if *base_address != AnyLinkableHash::from(author.clone()) {
        return Ok(ValidateCallbackResult::Invalid(
            "Profile links must originate from the author's own agent key".to_string(),
        ));
    }
    Ok(ValidateCallbackResult::Valid)
}

fn validate_agent_link_target(
    link_type: &LinkTypes,
    target_address: AnyLinkableHash,
    author: &AgentPubKey,
) -> ExternResult<ValidateCallbackResult> {
    let Some(target_hash) = target_address.into_action_hash() else {
        return Ok(ValidateCallbackResult::Invalid(
            "Profile links must point at an account or profile action".to_string(),
        ));
    };
    let target = must_get_valid_record(target_hash)?;
    Ok(check_agent_link_target(
        link_type,
        author,
        target.action().author(),
        target.entry().as_option(),
    ))
}

/// An agent link must point at the link author's own entry of the matching kind
pub fn check_agent_link_target(
    link_type: &LinkTypes,
    link_author: &AgentPubKey,
    target_author: &AgentPubKey,
    target_entry: Option<&Entry>,
) -> ValidateCallbackResult {
    if target_author != link_author {
        return ValidateCallbackResult::Invalid(
            "Profile links can only point at the author's own entries".to_string(),
        );
    }
    let matches_kind = match (link_type, target_entry) {
        (LinkTypes::AgentToAccount, Some(entry)) => UserAccount::try_from(entry).is_ok(),
        (LinkTypes::AgentToProfile, Some(entry)) => MedicalProfile::try_from(entry).is_ok(),
        _ => false,
    };
    if !matches_kind {
        return ValidateCallbackResult::Invalid(
            "Profile link target has the wrong entry type".to_string(),
        );
    }
    ValidateCallbackResult::Valid
}

fn to_callback_result(result: ValidationResult) -> ValidateCallbackResult {
    if result.is_valid() {
        ValidateCallbackResult::Valid
    } else {
        ValidateCallbackResult::Invalid(result.summary())
    }
}
