//! # IntegerKey Family
//!
//! A minimal key/value family over unsigned 32-bit integers.
//!
//! ## Payload
//!
//! ```json
//! { "Verb": "set", "Name": "alpha", "Value": 42 }
//! ```
//!
//! - `set` creates `Name`; fails if it already exists.
//! - `inc` / `dec` adjust an existing `Name`; fail on absence or overflow.
//!
//! ## Addressing
//!
//! `namespace (6 hex) || last 64 hex of sha512(Name)`. Names whose hashes
//! collide share one address, so the stored value is a JSON map.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use std::collections::BTreeMap;
use std::fmt;
use tp_processor::{ApplyError, TransactionContext, TransactionHandler};
use tp_types::TpProcessRequest;
use tracing::debug;

pub const FAMILY_NAME: &str = "intkey";
pub const FAMILY_VERSION: &str = "1.0";

const MAX_NAME_LEN: usize = 20;

/// First six hex characters of sha512("intkey").
pub fn namespace() -> String {
    let digest = hex::encode(Sha512::digest(FAMILY_NAME.as_bytes()));
    digest[..6].to_string()
}

/// State address holding `name`.
pub fn make_address(name: &str) -> String {
    let digest = hex::encode(Sha512::digest(name.as_bytes()));
    format!("{}{}", namespace(), &digest[digest.len() - 64..])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verb {
    Set,
    Inc,
    Dec,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set => write!(f, "set"),
            Self::Inc => write!(f, "inc"),
            Self::Dec => write!(f, "dec"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntkeyPayload {
    #[serde(rename = "Verb")]
    pub verb: Verb,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value")]
    pub value: u32,
}

impl IntkeyPayload {
    pub fn new(verb: Verb, name: impl Into<String>, value: u32) -> Self {
        Self {
            verb,
            name: name.into(),
            value,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        // A struct of a string, an enum and an integer always serializes.
        serde_json::to_vec(self).unwrap_or_default()
    }

    fn parse(bytes: &[u8]) -> Result<Self, ApplyError> {
        let payload: Self = serde_json::from_slice(bytes)
            .map_err(|e| ApplyError::invalid(format!("Failed to decode payload: {}", e)))?;

        if payload.name.is_empty() {
            return Err(ApplyError::invalid("Name is required"));
        }
        if payload.name.chars().count() > MAX_NAME_LEN {
            return Err(ApplyError::invalid(format!(
                "Name must be at most {} characters",
                MAX_NAME_LEN
            )));
        }
        Ok(payload)
    }
}

/// Handler for the `intkey` family.
#[derive(Debug, Clone)]
pub struct IntkeyHandler {
    namespace: String,
}

impl IntkeyHandler {
    pub fn new() -> Self {
        Self {
            namespace: namespace(),
        }
    }
}

impl Default for IntkeyHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransactionHandler for IntkeyHandler {
    fn family_name(&self) -> String {
        FAMILY_NAME.to_string()
    }

    fn family_versions(&self) -> Vec<String> {
        vec![FAMILY_VERSION.to_string()]
    }

    fn namespaces(&self) -> Vec<String> {
        vec![self.namespace.clone()]
    }

    async fn apply(
        &self,
        request: &TpProcessRequest,
        context: &dyn TransactionContext,
    ) -> Result<(), ApplyError> {
        let IntkeyPayload { verb, name, value } = IntkeyPayload::parse(&request.payload)?;
        let address = make_address(&name);

        let mut entries: BTreeMap<String, u32> = match context.get_state_entry(&address).await? {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                ApplyError::internal(format!("Corrupt state at {}: {}", address, e))
            })?,
            None => BTreeMap::new(),
        };
        let current = entries.get(&name).copied();

        let updated = match (verb, current) {
            (Verb::Set, Some(_)) => {
                return Err(ApplyError::invalid(format!(
                    "Verb is set but Name {} already in state",
                    name
                )))
            }
            (Verb::Set, None) => value,
            (Verb::Inc | Verb::Dec, None) => {
                return Err(ApplyError::invalid(format!(
                    "Verb is {} but Name {} not in state",
                    verb, name
                )))
            }
            (Verb::Inc, Some(current)) => current.checked_add(value).ok_or_else(|| {
                ApplyError::invalid(format!("Verb is inc but result would exceed {}", u32::MAX))
            })?,
            (Verb::Dec, Some(current)) => current.checked_sub(value).ok_or_else(|| {
                ApplyError::invalid("Verb is dec but result would be less than 0")
            })?,
        };

        debug!(name = %name, verb = %verb, value = updated, "Applying intkey update");
        entries.insert(name.clone(), updated);
        let data = serde_json::to_vec(&entries)
            .map_err(|e| ApplyError::internal(format!("Failed to encode state: {}", e)))?;
        context.set_state_entry(address, data).await?;

        context
            .add_event(
                format!("{}/{}", FAMILY_NAME, verb),
                vec![
                    ("name".to_string(), name),
                    ("value".to_string(), updated.to_string()),
                ],
                &[],
            )
            .await?;
        Ok(())
    }
}
