/*!
 * Keyloom Credential Resolution
 *
 * Given a typed consumer identity, produce the credential map an outer
 * layer can present to that consumer. Credentials form chains (a
 * registry's credentials live in a Vault, Vault's behind a cloud secret
 * manager, that manager's in configuration), so the core is a DAG of
 * identities plus a two-phase resolver: a direct graph walk, then a
 * concurrent first-wins dispatch across repository plugins.
 *
 * ## Usage
 *
 * ```no_run
 * # async fn example() -> keyloom_resolve::ResolveResult<()> {
 * use keyloom_resolve::{to_graph, CredentialsConfig, GraphOptions, Identity};
 * use tokio_util::sync::CancellationToken;
 *
 * let config = CredentialsConfig::from_yaml("consumers: []")?;
 * let graph = to_graph(&CancellationToken::new(), &config, GraphOptions::default())?;
 *
 * let request = Identity::new("OCIRegistry").with_attr("hostname", "docker.io");
 * let credentials = graph.resolve(&CancellationToken::new(), &request).await?;
 * # Ok(())
 * # }
 * ```
 */

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

pub mod config;
mod direct;
pub mod error;
mod indirect;
mod ingest;
pub mod plugin;

pub use config::{ConsumerEntry, CredentialsConfig, RepositoryEntry, DIRECT_CREDENTIAL_TYPE};
pub use error::{ResolveError, ResolveResult};
pub use plugin::{
    CredentialPlugin, CredentialPluginProvider, PluginError, RepositoryPlugin,
    RepositoryPluginProvider, ANY_CREDENTIAL_TYPE,
};

// Re-exported so callers need only this crate for the common flow.
pub use keyloom_common::{TypeName, TypeScheme, TypedObject};
pub use keyloom_dag::{DagError, DagSnapshot, EdgeKind, IdentityDag};
pub use keyloom_identity::{CredentialMap, Identity, ATTR_HOSTNAME, ATTR_PATH, ATTR_TYPE};

/// Options for graph construction.
#[derive(Clone)]
pub struct GraphOptions {
    /// Lookup for credential plugins by type name
    pub credential_plugins: CredentialPluginProvider,

    /// Lookup for repository plugins by type name
    pub repository_plugins: RepositoryPluginProvider,

    /// Registry used to instantiate typed repository prototypes
    pub repository_scheme: TypeScheme,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            credential_plugins: Arc::new(|_| None),
            repository_plugins: Arc::new(|_| None),
            repository_scheme: TypeScheme::new(),
        }
    }
}

impl fmt::Debug for GraphOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphOptions")
            .field("repository_scheme", &self.repository_scheme)
            .finish_non_exhaustive()
    }
}

/// The ingested credential graph.
///
/// Cheap to clone: the DAG and the plugin providers are shared. Safe
/// for concurrent resolution; memoization writes serialize through the
/// DAG's internal lock.
#[derive(Clone)]
pub struct Graph {
    dag: Arc<IdentityDag>,
    credential_plugins: CredentialPluginProvider,
    repository_plugins: RepositoryPluginProvider,
}

impl Graph {
    fn from_options(options: GraphOptions) -> Self {
        Self {
            dag: Arc::new(IdentityDag::new()),
            credential_plugins: options.credential_plugins,
            repository_plugins: options.repository_plugins,
        }
    }

    /// The underlying identity DAG.
    pub fn dag(&self) -> &IdentityDag {
        &self.dag
    }

    pub(crate) fn credential_plugin(
        &self,
        ty: &TypeName,
    ) -> Option<Arc<dyn CredentialPlugin>> {
        (self.credential_plugins)(ty)
    }

    pub(crate) fn repository_plugin(
        &self,
        ty: &TypeName,
    ) -> Option<Arc<dyn RepositoryPlugin>> {
        (self.repository_plugins)(ty)
    }

    /// Resolve credentials for the identity: direct chain walk first,
    /// indirect repository dispatch when no chain exists.
    ///
    /// The identity must carry a `type` attribute. The token is
    /// propagated to every plugin call and spawned worker; a cancelled
    /// resolution memoizes nothing.
    pub async fn resolve(
        &self,
        token: &CancellationToken,
        identity: &Identity,
    ) -> ResolveResult<CredentialMap> {
        if identity.kind().is_none() {
            return Err(ResolveError::InvalidIdentity);
        }

        match direct::resolve_direct(self, token, identity).await {
            Err(ResolveError::NoDirectCredentials) => {
                debug!(identity = %identity, "no direct chain, trying indirect resolution");
                indirect::resolve_indirect(self, token, identity).await
            }
            outcome => outcome,
        }
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("dag", &self.dag)
            .finish_non_exhaustive()
    }
}

/// Construct a graph by ingesting a parsed configuration.
///
/// Single-shot and deterministic: ingesting the same configuration
/// twice yields structurally identical graphs. Any cycle, self
/// reference, or malformed entry aborts the whole construction.
pub fn to_graph(
    token: &CancellationToken,
    config: &CredentialsConfig,
    options: GraphOptions,
) -> ResolveResult<Graph> {
    ingest::ingest(token, config, options)
}
