//! Sweettest Integration Tests for Share Links
//!
//! Alice issues a share link over her profile; Bob redeems it without any
//! prior relationship and must only see the granted scopes.

use anyhow::Result;
use holochain::conductor::config::ConductorConfig;
use holochain::conductor::ConductorBuilder;
use holochain::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================//
// Type Definitions (match zome types)
// ============================================================================//

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EmergencyContact {
    pub name: String,
    pub relation: String,
    pub phone: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MedicalProfileInput {
    pub blood_type: Option<String>,
    pub allergies: Option<String>,
    pub medications: Option<String>,
    pub conditions: Option<String>,
    pub emergency_contacts: Vec<EmergencyContact>,
    pub height: Option<String>,
    pub weight: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegisterAccountInput {
    pub display_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
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

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublicAccount {
    pub display_name: String,
    pub created_at: Timestamp,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IssueShareInput {
    pub scopes: Vec<String>,
    pub expires_in: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IssuedShare {
    pub token_id: String,
    pub token_hash: ActionHash,
    pub share_url: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RedeemShareInput {
    pub token: String,
    pub user_agent: Option<String>,
    pub access_location: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ScopedProfile {
    #[serde(default)]
    pub allergies: Option<Vec<String>>,
    #[serde(default)]
    pub medications: Option<Vec<String>>,
    #[serde(default)]
    pub conditions: Option<Vec<String>>,
    #[serde(default)]
    pub emergency_contacts: Option<Vec<EmergencyContact>>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RedeemedShare {
    pub token_id: String,
    pub patient_name: String,
    pub scopes: Vec<String>,
    pub expires_at: Timestamp,
    pub profile: ScopedProfile,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AccessLog {
    pub token_hash: ActionHash,
    pub owner: AgentPubKey,
    pub accessor: AgentPubKey,
    pub accessed_at: Timestamp,
    pub scopes_viewed: Vec<String>,
    pub user_agent: Option<String>,
    pub access_location: Option<String>,
}

// ============================================================================//
// Test Fixtures
// ============================================================================//

fn dna_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../workdir/careshare.dna")
}

async fn setup_two_agents() -> Result<(holochain::conductor::Conductor, CellId, CellId)> {
    let conductor = ConductorBuilder::new()
        .config(ConductorConfig::default())
        .build()
        .await?;

    let dna_file = DnaFile::from_file_content(&std::fs::read(dna_path())?).await?;
    let dna_hash = conductor.register_dna(dna_file).await?;

    let alice_key = conductor
        .keystore()
        .generate_new_sign_keypair_random()
        .await?;
    let bob_key = conductor
        .keystore()
        .generate_new_sign_keypair_random()
        .await?;

    let alice_cell = conductor
        .install_app(
            "share-test-alice".to_string(),
            vec![InstalledCell::new(
                CellId::new(dna_hash.clone(), alice_key),
                "careshare".into(),
            )],
        )
        .await?
        .into_iter()
        .next()
        .unwrap()
        .into_id();

    let bob_cell = conductor
        .install_app(
            "share-test-bob".to_string(),
            vec![InstalledCell::new(
                CellId::new(dna_hash, bob_key),
                "careshare".into(),
            )],
        )
        .await?
        .into_iter()
        .next()
        .unwrap()
        .into_id();

    Ok((conductor, alice_cell, bob_cell))
}

fn alice_profile() -> MedicalProfileInput {
    MedicalProfileInput {
        blood_type: Some("O-".to_string()),
        allergies: Some("Penicillin, Latex".to_string()),
        medications: Some("Warfarin".to_string()),
        conditions: Some("Atrial fibrillation".to_string()),
        emergency_contacts: vec![EmergencyContact {
            name: "Bob Owner".to_string(),
            relation: "Spouse".to_string(),
            phone: "+1-555-010-0101".to_string(),
        }],
        height: None,
        weight: None,
    }
}

async fn alice_issues(
    conductor: &holochain::conductor::Conductor,
    alice_cell: &CellId,
    scopes: &[&str],
) -> Result<IssuedShare> {
    let _: Record = conductor
        .call_zome(alice_cell, "profile", "save_profile", alice_profile())
        .await?;

    let issued: IssuedShare = conductor
        .call_zome(
            alice_cell,
            "sharing",
            "issue_share_token",
            IssueShareInput {
                scopes: scopes.iter().map(|s| s.to_string()).collect(),
                expires_in: "15m".to_string(),
            },
        )
        .await?;
    Ok(issued)
}

fn redeem_input(token: &str) -> RedeemShareInput {
    RedeemShareInput {
        token: token.to_string(),
        user_agent: Some("sweettest".to_string()),
        access_location: None,
    }
}

// ============================================================================//
// Tests
// ============================================================================//

#[tokio::test]
#[ignore = "Requires running Holochain conductor"]
async fn test_redemption_returns_only_granted_scopes() -> Result<()> {
    let (conductor, alice_cell, bob_cell) = setup_two_agents().await?;

    let _: Record = conductor
        .call_zome(
            &alice_cell,
            "profile",
            "register_account",
            RegisterAccountInput {
                display_name: Some("Alice".to_string()),
                email: None,
            },
        )
        .await?;
    let issued = alice_issues(&conductor, &alice_cell, &["allergies", "emergencyContacts"]).await?;
    assert!(issued.share_url.ends_with(&issued.token_id));

    let redeemed: RedeemedShare = conductor
        .call_zome(&bob_cell, "sharing", "redeem_share_token", redeem_input(&issued.share_url))
        .await?;

    assert_eq!(redeemed.patient_name, "Alice");
    assert_eq!(redeemed.scopes, vec!["allergies", "emergencyContacts"]);
    assert_eq!(
        redeemed.profile.allergies,
        Some(vec!["Penicillin".to_string(), "Latex".to_string()])
    );
    assert_eq!(redeemed.profile.medications, None);
    assert_eq!(redeemed.profile.conditions, None);
    assert_eq!(redeemed.profile.emergency_contacts.map(|c| c.len()), Some(1));

    Ok(())
}

#[tokio::test]
#[ignore = "Requires running Holochain conductor"]
async fn test_empty_scope_selection_rejected() -> Result<()> {
    let (conductor, alice_cell, _bob_cell) = setup_two_agents().await?;

    let result: Result<IssuedShare, _> = conductor
        .call_zome(
            &alice_cell,
            "sharing",
            "issue_share_token",
            IssueShareInput {
                scopes: vec![],
                expires_in: "1h".to_string(),
            },
        )
        .await;

    let err = format!("{:?}", result.expect_err("Empty scopes must be rejected"));
    assert!(err.contains("Select at least one data type to share"));

    Ok(())
}

#[tokio::test]
#[ignore = "Requires running Holochain conductor"]
async fn test_unknown_token_is_not_found() -> Result<()> {
    let (conductor, _alice_cell, bob_cell) = setup_two_agents().await?;

    let unknown = holo_hash::ActionHashB64::from(ActionHash::from_raw_36(vec![0x5a; 36])).to_string();
    let result: Result<RedeemedShare, _> = conductor
        .call_zome(&bob_cell, "sharing", "redeem_share_token", redeem_input(&unknown))
        .await;

    let err = format!("{:?}", result.expect_err("Unknown token must be refused"));
    assert!(err.contains("Not found: Invalid or expired access code."));
    assert!(!err.contains("Expired:"));

    Ok(())
}

#[tokio::test]
#[ignore = "Requires running Holochain conductor"]
async fn test_each_redemption_is_logged_for_owner_only() -> Result<()> {
    let (conductor, alice_cell, bob_cell) = setup_two_agents().await?;
    let issued = alice_issues(&conductor, &alice_cell, &["medications"]).await?;

    for _ in 0..2 {
        let redeemed: RedeemedShare = conductor
            .call_zome(&bob_cell, "sharing", "redeem_share_token", redeem_input(&issued.token_id))
            .await?;
        assert_eq!(redeemed.profile.medications, Some(vec!["Warfarin".to_string()]));
    }

    let logs: Vec<AccessLog> = conductor
        .call_zome(&alice_cell, "sharing", "get_token_access_logs", issued.token_id.clone())
        .await?;
    assert_eq!(logs.len(), 2);
    assert!(logs.iter().all(|log| &log.accessor == bob_cell.agent_pubkey()));
    assert!(logs.iter().all(|log| log.scopes_viewed == vec!["medications".to_string()]));

    let foreign: Result<Vec<AccessLog>, _> = conductor
        .call_zome(&bob_cell, "sharing", "get_token_access_logs", issued.token_id)
        .await;
    assert!(foreign.is_err(), "Only the token owner may read its access logs");

    Ok(())
}

#[tokio::test]
#[ignore = "Requires running Holochain conductor"]
async fn test_other_agents_cannot_read_profile_without_token() -> Result<()> {
    let (conductor, alice_cell, bob_cell) = setup_two_agents().await?;

    let _: Record = conductor
        .call_zome(
            &alice_cell,
            "profile",
            "register_account",
            RegisterAccountInput {
                display_name: Some("Alice".to_string()),
                email: Some("alice@example.com".to_string()),
            },
        )
        .await?;
    let issued = alice_issues(&conductor, &alice_cell, &["allergies"]).await?;
    let alice_key = alice_cell.agent_pubkey().clone();

    let direct: Result<Option<MedicalProfile>, _> = conductor
        .call_zome(&bob_cell, "profile", "get_agent_profile", alice_key.clone())
        .await;
    assert!(direct.is_err(), "There is no unguarded profile lookup");

    let unknown = ActionHash::from_raw_36(vec![0x5a; 36]);
    let forged: Result<Option<MedicalProfile>, _> = conductor
        .call_zome(&bob_cell, "profile", "get_shared_profile", unknown)
        .await;
    let err = format!("{:?}", forged.expect_err("A hash that is not a token must be refused"));
    assert!(err.contains("Share token not found"));

    let shared: Option<MedicalProfile> = conductor
        .call_zome(&bob_cell, "profile", "get_shared_profile", issued.token_hash)
        .await?;
    let shared = shared.expect("Alice saved a profile");
    assert_eq!(shared.allergies, vec!["Penicillin".to_string(), "Latex".to_string()]);
    assert!(shared.medications.is_empty());
    assert!(shared.emergency_contacts.is_empty());
    assert_eq!(shared.blood_type, None);

    let account: Option<PublicAccount> = conductor
        .call_zome(&bob_cell, "profile", "get_agent_account", alice_key)
        .await?;
    assert_eq!(account.map(|a| a.display_name), Some("Alice".to_string()));

    Ok(())
}
