//! Plugin contracts consumed by the resolvers.
//!
//! The core never implements these. Credential plugins translate one
//! credential type (Vault, cloud secret manager, ...) into a consumer
//! identity and later transform dependency credentials into the final
//! map. Repository plugins probe external secret stores during indirect
//! resolution. Both kinds are looked up through provider functions
//! stored on the graph, keyed by type name.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use keyloom_common::{TypeName, TypedObject};
use keyloom_identity::{CredentialMap, Identity};

/// Sentinel type name tried by the indirect resolver when no repository
/// plugin is registered for the request identity's own type.
pub const ANY_CREDENTIAL_TYPE: &str = "AnyCredentialType";

/// Opaque wrapper around a plugin-side failure
#[derive(Debug, Error)]
#[error("{0}")]
pub struct PluginError(String);

impl PluginError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Contract for one credential type.
#[async_trait]
pub trait CredentialPlugin: Send + Sync {
    /// The identity a caller must be able to authenticate as in order
    /// to use this credential.
    fn consumer_identity(&self, credential: &TypedObject) -> Result<Identity, PluginError>;

    /// Given the resolved credentials of the child identity (what
    /// authenticates *to* the credential store), produce the final
    /// credential map for the consumer. May block on I/O; the token is
    /// the caller's cancellation context.
    async fn resolve(
        &self,
        token: &CancellationToken,
        child: &Identity,
        child_credentials: &CredentialMap,
    ) -> Result<CredentialMap, PluginError>;
}

/// Contract for one repository type.
#[async_trait]
pub trait RepositoryPlugin: Send + Sync {
    /// Repository configuration types this plugin can consume.
    fn supported_repository_config_types(&self) -> Vec<TypeName>;

    /// The identity used to authenticate to the repository itself.
    fn consumer_identity(&self, config: &TypedObject) -> Result<Identity, PluginError>;

    /// Ask the repository for credentials matching the request
    /// identity. `auth` is absent when the repository's own consumer
    /// identity could not be resolved; the plugin decides whether it
    /// can proceed anonymously.
    async fn resolve(
        &self,
        token: &CancellationToken,
        config: &TypedObject,
        request: &Identity,
        auth: Option<&CredentialMap>,
    ) -> Result<CredentialMap, PluginError>;
}

/// Lookup function for credential plugins, keyed by type name
pub type CredentialPluginProvider =
    Arc<dyn Fn(&TypeName) -> Option<Arc<dyn CredentialPlugin>> + Send + Sync>;

/// Lookup function for repository plugins, keyed by type name
pub type RepositoryPluginProvider =
    Arc<dyn Fn(&TypeName) -> Option<Arc<dyn RepositoryPlugin>> + Send + Sync>;
