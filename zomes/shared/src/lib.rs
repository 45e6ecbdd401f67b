//! CareShare Shared Utilities
//!
//! Common functionality for the CareShare coordinator zomes:
//! - Error taxonomy surfaced to callers
//! - Ownership checks against record authors
//! - Local cross-zome calls
//! - Link to record batching and pagination
//! - Log fingerprints for bearer identifiers

use hdk::prelude::*;
use serde::{Deserialize, Serialize};

// Re-export commonly used items
pub use access_control::*;
pub use audit::*;
pub use batch::*;
pub use types::*;
pub use zome_calls::*;

pub use careshare_validation::{ValidationErrorCode, ValidationFailure, ValidationResult};

/// Common types used across zomes
pub mod types {
    use super::*;

    /// Input for paginated queries
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct PaginationInput {
        pub offset: usize,
        pub limit: usize,
    }

    impl PaginationInput {
        pub const MAX_LIMIT: usize = 100;

        pub fn validate(&self) -> ExternResult<()> {
            if self.limit > Self::MAX_LIMIT {
                return Err(HealthError::ValidationFailure(format!(
                    "Limit cannot exceed {}",
                    Self::MAX_LIMIT
                ))
                .into());
            }
            if self.limit == 0 {
                return Err(
                    HealthError::ValidationFailure("Limit must be greater than 0".to_string()).into(),
                );
            }
            Ok(())
        }
    }

    impl Default for PaginationInput {
        fn default() -> Self {
            Self {
                offset: 0,
                limit: 50,
            }
        }
    }

    /// Result wrapper for paginated queries
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct PaginatedResult<T> {
        pub items: Vec<T>,
        pub total: usize,
        pub offset: usize,
        pub limit: usize,
        pub has_more: bool,
    }

    impl<T> PaginatedResult<T> {
        pub fn new(items: Vec<T>, total: usize, pagination: &PaginationInput) -> Self {
            Self {
                has_more: pagination.offset + items.len() < total,
                items,
                total,
                offset: pagination.offset,
                limit: pagination.limit,
            }
        }

        pub fn empty(pagination: &PaginationInput) -> Self {
            Self {
                items: Vec::new(),
                total: 0,
                offset: pagination.offset,
                limit: pagination.limit,
                has_more: false,
            }
        }
    }

    /// Slice an already ordered list into one page
    pub fn paginate<T>(items: Vec<T>, pagination: &PaginationInput) -> ExternResult<PaginatedResult<T>> {
        pagination.validate()?;
        let total = items.len();
        if pagination.offset >= total {
            return Ok(PaginatedResult {
                total,
                ..PaginatedResult::empty(pagination)
            });
        }
        let page: Vec<T> = items
            .into_iter()
            .skip(pagination.offset)
            .take(pagination.limit)
            .collect();
        Ok(PaginatedResult::new(page, total, pagination))
    }

    /// Error taxonomy surfaced by every CareShare zome function
    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
    pub enum HealthError {
        #[error("Not found: {0}")]
        NotFound(String),
        #[error("Expired: {0}")]
        Expired(String),
        #[error("Unauthorized: {0}")]
        Unauthorized(String),
        #[error("Validation error: {0}")]
        ValidationFailure(String),
        #[error("Upstream failure: {0}")]
        Upstream(String),
        #[error("Access denied: {0}")]
        AccessDenied(String),
        #[error("Internal error: {0}")]
        Internal(String),
    }

    impl HealthError {
        pub fn access_denied(reason: impl Into<String>) -> Self {
            HealthError::AccessDenied(reason.into())
        }

        pub fn upstream(err: WasmError) -> Self {
            HealthError::Upstream(err.to_string())
        }
    }

    impl From<HealthError> for WasmError {
        fn from(err: HealthError) -> Self {
            wasm_error!(WasmErrorInner::Guest(err.to_string()))
        }
    }

    impl From<ValidationFailure> for HealthError {
        fn from(failure: ValidationFailure) -> Self {
            let messages: Vec<String> = failure.errors.iter().map(|e| e.to_string()).collect();
            HealthError::ValidationFailure(messages.join("; "))
        }
    }

    /// Reject a form before anything reaches the source chain
    pub fn ensure_valid(result: ValidationResult) -> ExternResult<()> {
        result
            .into_result()
            .map_err(|failure| HealthError::from(failure).into())
    }
}

/// Ownership checks - every entry belongs to the agent that authored it
pub mod access_control {
    use super::*;

    /// The agent making the current zome call
    pub fn caller() -> ExternResult<AgentPubKey> {
        Ok(agent_info()?.agent_initial_pubkey)
    }

    /// Fail unless `agent` authored `record`
    pub fn require_author(record: &Record, agent: &AgentPubKey) -> Result<(), HealthError> {
        if record.action().author() == agent {
            Ok(())
        } else {
            Err(HealthError::Unauthorized(
                "Only the owner can access this entry".to_string(),
            ))
        }
    }

    /// Fetch a record and make sure the caller owns it
    pub fn get_owned_record(hash: ActionHash, what: &str) -> ExternResult<Record> {
        let record = get(hash, GetOptions::default())?
            .ok_or_else(|| HealthError::NotFound(format!("{} not found", what)))?;
        require_author(&record, &caller()?)?;
        Ok(record)
    }

    /// Decode the app entry of a record
    pub fn decode_entry<T>(record: &Record, what: &str) -> ExternResult<T>
    where
        T: TryFrom<SerializedBytes, Error = SerializedBytesError>,
    {
        record
            .entry()
            .to_app_option::<T>()
            .map_err(|e| wasm_error!(WasmErrorInner::Guest(e.to_string())))?
            .ok_or_else(|| HealthError::NotFound(format!("Invalid {} entry", what)).into())
    }
}

/// Log helpers for identifiers that act as bearer capabilities
pub mod audit {
    use super::*;
    use sha2::{Digest, Sha256};

    /// Short, stable fingerprint safe to write to logs
    pub fn fingerprint(bytes: &[u8]) -> String {
        let digest = Sha256::digest(bytes);
        digest[..6].iter().map(|b| format!("{:02x}", b)).collect()
    }

    pub fn action_fingerprint(hash: &ActionHash) -> String {
        fingerprint(hash.get_raw_39())
    }
}

/// Local cross-zome calls
pub mod zome_calls {
    use super::*;

    /// Call another zome of this cell and decode its response
    pub fn call_local<I, O>(zome_name: &str, fn_name: &str, input: I) -> ExternResult<O>
    where
        I: Serialize + std::fmt::Debug,
        O: serde::de::DeserializeOwned + std::fmt::Debug,
    {
        let response = call(
            CallTargetCell::Local,
            zome_name,
            fn_name.into(),
            None,
            input,
        )?;

        match response {
            ZomeCallResponse::Ok(extern_io) => extern_io.decode().map_err(|e| {
                HealthError::Upstream(format!(
                    "Failed to decode {}::{} response: {:?}",
                    zome_name, fn_name, e
                ))
                .into()
            }),
            ZomeCallResponse::Unauthorized(_, _, _, _) => Err(HealthError::Upstream(format!(
                "Unauthorized to call {}::{}",
                zome_name, fn_name
            ))
            .into()),
            ZomeCallResponse::NetworkError(err) => Err(HealthError::Upstream(format!(
                "Network error calling {}::{}: {}",
                zome_name, fn_name, err
            ))
            .into()),
            ZomeCallResponse::CountersigningSession(err) => Err(HealthError::Upstream(format!(
                "Countersigning error calling {}::{}: {}",
                zome_name, fn_name, err
            ))
            .into()),
            ZomeCallResponse::AuthenticationFailed(_, _) => Err(HealthError::Upstream(format!(
                "Authentication failed calling {}::{}",
                zome_name, fn_name
            ))
            .into()),
        }
    }
}

/// Batch operations for fetching link targets
pub mod batch {
    use super::*;

    /// Result of a batch get operation
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct BatchGetResult {
        /// Successfully fetched records
        pub records: Vec<Record>,
        /// Hashes that were not found (deleted or not yet gossiped)
        pub not_found: Vec<ActionHash>,
    }

    /// Fetch every hash, skipping the ones the DHT cannot resolve
    pub fn batch_get_records(hashes: Vec<ActionHash>) -> ExternResult<BatchGetResult> {
        let mut result = BatchGetResult {
            records: Vec::with_capacity(hashes.len()),
            not_found: Vec::new(),
        };

        for hash in hashes {
            match get(hash.clone(), GetOptions::default())? {
                Some(record) => result.records.push(record),
                None => result.not_found.push(hash),
            }
        }

        Ok(result)
    }

    /// Get records from links
    pub fn links_to_records(links: Vec<Link>) -> ExternResult<Vec<Record>> {
        let hashes: Vec<ActionHash> = links
            .into_iter()
            .filter_map(|link| link.target.into_action_hash())
            .collect();

        Ok(batch_get_records(hashes)?.records)
    }

    /// Get the most recent N records from links (newest link first)
    pub fn links_to_recent_records(mut links: Vec<Link>, count: usize) -> ExternResult<Vec<Record>> {
        links.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let hashes: Vec<ActionHash> = links
            .into_iter()
            .filter_map(|link| link.target.into_action_hash())
            .take(count)
            .collect();

        Ok(batch_get_records(hashes)?.records)
    }

    /// Latest record reachable from a set of links
    pub fn latest_linked_record(links: Vec<Link>) -> ExternResult<Option<Record>> {
        Ok(links_to_recent_records(links, 1)?.into_iter().next())
    }
}
