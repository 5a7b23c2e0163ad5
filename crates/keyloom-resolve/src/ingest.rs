//! Ingestion: declarative configuration into an identity DAG.
//!
//! Three phases in order. Phase A extracts direct credentials and
//! attaches the merged maps to consumer vertices. Phase B builds data
//! edges from consumers to the identities their plugin credentials
//! represent. Phase C registers repository configurations through the
//! type scheme. Any failure aborts the whole construction; two runs
//! over the same configuration yield structurally identical graphs.

use std::collections::BTreeMap;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use keyloom_dag::EdgeKind;
use keyloom_identity::{CredentialMap, Identity};

use keyloom_common::TypedObject;

use crate::config::{direct_properties, is_direct_credential, CredentialsConfig};
use crate::error::{ResolveError, ResolveResult};
use crate::{Graph, GraphOptions};

pub(crate) fn ingest(
    token: &CancellationToken,
    config: &CredentialsConfig,
    options: GraphOptions,
) -> ResolveResult<Graph> {
    let scheme = options.repository_scheme.clone();
    let graph = Graph::from_options(options);
    let dag = graph.dag();

    // Phase A: direct credential extraction. Later direct entries
    // overwrite earlier ones, both within a consumer and across
    // consumers sharing an identity.
    let mut direct_maps: BTreeMap<String, CredentialMap> = BTreeMap::new();
    let mut retained: Vec<(Vec<Identity>, Vec<TypedObject>)> = Vec::new();

    for consumer in &config.consumers {
        if token.is_cancelled() {
            return Err(ResolveError::Cancelled);
        }

        let mut direct: Option<CredentialMap> = None;
        let mut plugin_credentials = Vec::new();

        for credential in &consumer.credentials {
            if credential.ty().is_empty() {
                return Err(ResolveError::InvalidConfig(
                    "credential with empty type".to_string(),
                ));
            }
            if is_direct_credential(credential) {
                let properties = direct_properties(credential)?;
                direct
                    .get_or_insert_with(CredentialMap::new)
                    .extend(properties);
            } else {
                plugin_credentials.push(credential.clone());
            }
        }

        let identities = consumer.all_identities();
        for identity in &identities {
            dag.add_vertex(identity.clone())?;
            if let Some(direct) = &direct {
                direct_maps
                    .entry(identity.canonical())
                    .or_default()
                    .extend(direct.clone());
            }
        }
        if !plugin_credentials.is_empty() {
            retained.push((identities, plugin_credentials));
        }
    }

    for (canonical, credentials) in &direct_maps {
        dag.set_credentials(canonical, credentials.clone());
    }
    debug!(
        vertices = dag.len(),
        direct = direct_maps.len(),
        "direct credential extraction complete"
    );

    // Phase B: plugin-based edge construction.
    if token.is_cancelled() {
        return Err(ResolveError::Cancelled);
    }
    for (identities, credentials) in &retained {
        for identity in identities {
            for credential in credentials {
                let plugin = graph.credential_plugin(credential.ty()).ok_or_else(|| {
                    ResolveError::MissingCredentialPlugin(credential.ty().to_string())
                })?;

                let credential_identity =
                    plugin
                        .consumer_identity(credential)
                        .map_err(|source| ResolveError::Plugin {
                            identity: identity.canonical(),
                            source,
                        })?;

                dag.add_vertex(credential_identity.clone())?;
                dag.add_edge(identity, &credential_identity, EdgeKind::Data)?;
            }
        }
    }
    debug!(vertices = dag.len(), "plugin edge construction complete");

    // Phase C: repository registration.
    if token.is_cancelled() {
        return Err(ResolveError::Cancelled);
    }
    for entry in &config.repositories {
        let repository = scheme.convert(&entry.repository)?;
        dag.add_repository(repository);
    }
    debug!(
        repositories = config.repositories.len(),
        "repository registration complete"
    );

    Ok(graph)
}
