//! Configuration wire format.
//!
//! A credentials config document has a `type` discriminator, a list of
//! repository entries, and a list of consumers. Each consumer carries
//! one or more identities plus one or more credentials. The singular
//! legacy `identity:` form is accepted and folded into `identities`.
//! Credential and repository blobs keep their plugin-defined fields
//! through the generic [`TypedObject`] representation.

use serde::{Deserialize, Serialize};

use keyloom_common::{TypeName, TypedObject};
use keyloom_identity::{CredentialMap, Identity};

use crate::error::{ResolveError, ResolveResult};

/// Base type of credentials whose `properties` map is the final result
pub const DIRECT_CREDENTIAL_TYPE: &str = "Credentials";

/// A parsed credentials configuration document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Config kind discriminator (e.g. `credentials.config.keyloom/v1`)
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub config_type: Option<TypeName>,

    /// Typed repository configurations consulted by indirect resolution
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repositories: Vec<RepositoryEntry>,

    /// Consumers: identities plus the credentials that serve them
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub consumers: Vec<ConsumerEntry>,
}

impl CredentialsConfig {
    /// Parse a YAML document.
    pub fn from_yaml(input: &str) -> ResolveResult<Self> {
        serde_yaml::from_str(input).map_err(|e| ResolveError::InvalidConfig(e.to_string()))
    }

    /// Parse a JSON document.
    pub fn from_json(input: &str) -> ResolveResult<Self> {
        serde_json::from_str(input).map_err(|e| ResolveError::InvalidConfig(e.to_string()))
    }
}

/// One repository registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryEntry {
    /// The typed repository blob
    pub repository: TypedObject,
}

/// One consumer: who needs credentials, and which credentials serve it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsumerEntry {
    /// Legacy singular form, folded into `identities`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identities: Vec<Identity>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub credentials: Vec<TypedObject>,
}

impl ConsumerEntry {
    /// All identities of the consumer, the legacy singular entry first.
    pub fn all_identities(&self) -> Vec<Identity> {
        let mut out = Vec::with_capacity(self.identities.len() + 1);
        if let Some(identity) = &self.identity {
            out.push(identity.clone());
        }
        out.extend(self.identities.iter().cloned());
        out
    }
}

/// True when the credential is direct: its `properties` map is already
/// the final result. Matches `Credentials` versioned or not.
pub fn is_direct_credential(credential: &TypedObject) -> bool {
    credential.ty().base() == DIRECT_CREDENTIAL_TYPE
}

/// Decode the `properties` map of a direct credential.
pub fn direct_properties(credential: &TypedObject) -> ResolveResult<CredentialMap> {
    let mut map = CredentialMap::new();
    let Some(properties) = credential.value().get("properties") else {
        return Ok(map);
    };
    let object = properties.as_object().ok_or_else(|| {
        ResolveError::InvalidConfig("credential `properties` must be a map".to_string())
    })?;

    for (key, value) in object {
        let value = value.as_str().ok_or_else(|| {
            ResolveError::InvalidConfig(format!("credential property {key} must be a string"))
        })?;
        map.insert(key.clone(), value.to_string());
    }
    Ok(map)
}

/// Well-known type name helper for direct credentials.
pub fn direct_credential_type() -> TypeName {
    TypeName::new(DIRECT_CREDENTIAL_TYPE)
}
