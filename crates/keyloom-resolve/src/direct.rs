//! Direct resolution: match-then-descend walk of the identity DAG.
//!
//! The walk matches the request against the vertex set, descends along
//! the single outgoing data edge, resolves the child first, and hands
//! child identity plus child credentials to the child's credential
//! plugin to produce this hop's map. Results are memoized on the
//! request identity's canonical string.

use std::collections::BTreeSet;

use futures::future::{BoxFuture, FutureExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use keyloom_common::TypeName;
use keyloom_identity::{CredentialMap, Identity};

use crate::error::{ResolveError, ResolveResult};
use crate::Graph;

/// Resolve an identity through the configured credential chains.
///
/// `NoDirectCredentials` means the graph holds no chain for this
/// identity; callers fall back to indirect resolution.
pub(crate) async fn resolve_direct(
    graph: &Graph,
    token: &CancellationToken,
    identity: &Identity,
) -> ResolveResult<CredentialMap> {
    // Per-call descent set: wildcard matching can route distinct
    // request identities to the same vertex, which ingestion-time cycle
    // detection cannot always see.
    let mut descent = BTreeSet::new();
    descend(graph, token, identity, &mut descent).await
}

fn descend<'a>(
    graph: &'a Graph,
    token: &'a CancellationToken,
    identity: &'a Identity,
    descent: &'a mut BTreeSet<String>,
) -> BoxFuture<'a, ResolveResult<CredentialMap>> {
    async move {
        if token.is_cancelled() {
            return Err(ResolveError::Cancelled);
        }

        let Some(matched) = graph.dag().match_any_vertex(identity) else {
            debug!(identity = %identity, "no vertex matches request");
            return Err(ResolveError::NoDirectCredentials);
        };

        if !descent.insert(matched.canonical.clone()) {
            return Err(ResolveError::UnresolvedCycle {
                identity: matched.canonical,
            });
        }

        if let Some(credentials) = matched.credentials {
            debug!(identity = %matched.canonical, "returning cached credentials");
            return Ok(credentials);
        }

        let children = graph.dag().data_children(&matched.canonical);
        let child_canonical = match children.as_slice() {
            // A leaf without cached credentials has no direct chain;
            // the indirect path is the intended next step.
            [] => return Err(ResolveError::NoDirectCredentials),
            [child] => child.clone(),
            many => {
                return Err(ResolveError::AmbiguousGraph {
                    identity: matched.canonical,
                    count: many.len(),
                })
            }
        };

        let Some(child_identity) = graph.dag().identity_of(&child_canonical) else {
            // Edge to a vertex that no longer exists cannot happen for
            // graphs built by ingestion; treat it as a missing chain.
            debug!(child = %child_canonical, "data edge target has no vertex");
            return Err(ResolveError::NoDirectCredentials);
        };

        let child_credentials = descend(graph, token, &child_identity, descent).await?;

        let child_type = TypeName::new(child_identity.kind().unwrap_or_default());
        let plugin = graph
            .credential_plugin(&child_type)
            .ok_or_else(|| ResolveError::MissingCredentialPlugin(child_type.to_string()))?;

        // The graph lock is never held here; the plugin may block on
        // I/O against the credential store.
        let credentials = plugin
            .resolve(token, &child_identity, &child_credentials)
            .await
            .map_err(|source| ResolveError::Plugin {
                identity: child_identity.canonical(),
                source,
            })?;

        if token.is_cancelled() {
            // A cancelled resolution performs no memoization.
            return Err(ResolveError::Cancelled);
        }

        graph
            .dag()
            .set_credentials(&identity.canonical(), credentials.clone());
        debug!(identity = %identity, "direct resolution complete");

        Ok(credentials)
    }
    .boxed()
}
