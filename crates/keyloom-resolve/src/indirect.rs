//! Indirect resolution: concurrent first-wins dispatch across
//! registered repository configurations.
//!
//! Invoked only after direct resolution reported no chain. One worker
//! is spawned per repository configuration the plugin supports; the
//! first successful result wins, peers are cancelled through a derived
//! token, and their late errors are discarded. When every worker fails
//! the joined causes are reported in repository-registration order.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use keyloom_common::{TypeName, TypedObject};
use keyloom_identity::{CredentialMap, Identity};

use crate::direct::resolve_direct;
use crate::error::{ResolveError, ResolveResult};
use crate::plugin::{RepositoryPlugin, ANY_CREDENTIAL_TYPE};
use crate::Graph;

pub(crate) async fn resolve_indirect(
    graph: &Graph,
    token: &CancellationToken,
    identity: &Identity,
) -> ResolveResult<CredentialMap> {
    let canonical = identity.canonical();

    // Indirect results are memoized too.
    if let Some(credentials) = graph.dag().credentials(&canonical) {
        debug!(identity = %canonical, "returning cached indirect credentials");
        return Ok(credentials);
    }

    let kind = TypeName::new(identity.kind().unwrap_or_default());
    let plugin = lookup_plugin(graph, &kind)?;

    let supported = plugin.supported_repository_config_types();
    let candidates: Vec<(usize, TypedObject)> = graph
        .dag()
        .repositories()
        .into_iter()
        .enumerate()
        .filter(|(_, repository)| {
            supported
                .iter()
                .any(|ty| ty == repository.ty() || ty.same_base(repository.ty()))
        })
        .collect();

    debug!(
        identity = %canonical,
        candidates = candidates.len(),
        "dispatching indirect workers"
    );

    let worker_token = token.child_token();
    let (tx, mut rx) = mpsc::channel(candidates.len().max(1));
    let mut handles = Vec::with_capacity(candidates.len());

    for (index, repository) in candidates {
        let graph = graph.clone();
        let plugin = Arc::clone(&plugin);
        let request = identity.clone();
        let token = worker_token.clone();
        let tx = tx.clone();

        handles.push(tokio::spawn(async move {
            let outcome = probe_repository(&graph, &token, &plugin, &repository, &request).await;
            // The receiver may be gone if the caller was dropped.
            let _ = tx.send((index, repository, outcome)).await;
        }));
    }
    drop(tx);

    let mut winner: Option<CredentialMap> = None;
    let mut failures: Vec<(usize, String, ResolveError)> = Vec::new();

    while let Some((index, repository, outcome)) = rx.recv().await {
        match outcome {
            Ok(credentials) => {
                if winner.is_none() {
                    debug!(repository = %repository.ty(), "indirect worker won");
                    winner = Some(credentials);
                    // First wins; peers exit early via the derived token.
                    worker_token.cancel();
                }
            }
            Err(error) => {
                if winner.is_none() {
                    warn!(repository = %repository.ty(), %error, "indirect worker failed");
                }
                failures.push((index, repository.ty().to_string(), error));
            }
        }
    }
    for handle in handles {
        let _ = handle.await;
    }

    if token.is_cancelled() {
        // A cancelled resolution performs no memoization.
        return Err(ResolveError::Cancelled);
    }

    match winner {
        Some(credentials) => {
            graph.dag().set_credentials(&canonical, credentials.clone());
            Ok(credentials)
        }
        None => {
            failures.sort_by_key(|(index, _, _)| *index);
            let causes = failures
                .into_iter()
                .map(|(_, repository, error)| format!("{repository}: {error}"))
                .collect();
            Err(ResolveError::IndirectResolution { causes })
        }
    }
}

/// Plugin lookup by the identity's type, falling back to the
/// `AnyCredentialType` sentinel.
fn lookup_plugin(graph: &Graph, kind: &TypeName) -> ResolveResult<Arc<dyn RepositoryPlugin>> {
    if let Some(plugin) = graph.repository_plugin(kind) {
        return Ok(plugin);
    }
    let fallback = TypeName::new(ANY_CREDENTIAL_TYPE);
    if let Some(plugin) = graph.repository_plugin(&fallback) {
        return Ok(plugin);
    }
    Err(ResolveError::NoResolver {
        tried: vec![kind.to_string(), fallback.to_string()],
    })
}

/// One worker: authenticate to the repository, then ask it for the
/// request identity's credentials.
async fn probe_repository(
    graph: &Graph,
    token: &CancellationToken,
    plugin: &Arc<dyn RepositoryPlugin>,
    repository: &TypedObject,
    request: &Identity,
) -> ResolveResult<CredentialMap> {
    if token.is_cancelled() {
        return Err(ResolveError::Cancelled);
    }

    let repository_identity =
        plugin
            .consumer_identity(repository)
            .map_err(|source| ResolveError::Plugin {
                identity: request.canonical(),
                source,
            })?;

    // Best effort: repository-to-repository recursion into indirect
    // resolution is forbidden, and missing auth is for the plugin to
    // judge.
    let auth = match resolve_direct(graph, token, &repository_identity).await {
        Ok(credentials) => Some(credentials),
        Err(error) => {
            debug!(
                repository = %repository.ty(),
                identity = %repository_identity,
                %error,
                "repository authentication unresolved, proceeding without"
            );
            None
        }
    };

    plugin
        .resolve(token, repository, request, auth.as_ref())
        .await
        .map_err(|source| ResolveError::Plugin {
            identity: request.canonical(),
            source,
        })
}
