/*!
 * Keyloom Identity DAG
 *
 * The directed acyclic graph at the heart of credential resolution.
 * Vertices are identities keyed by their canonical string; a data edge
 * from consumer to provider says "the credentials for this consumer
 * live behind that identity". Every mutation that would close a cycle
 * is rejected before commit, so the graph is acyclic at all observable
 * moments.
 */

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use keyloom_common::TypedObject;
use keyloom_identity::{CredentialMap, Identity};

/// Errors that can occur while mutating the DAG
#[derive(Debug, Error)]
pub enum DagError {
    /// The edge would close a cycle
    #[error("edge {from} -> {to} would close a cycle")]
    Cycle { from: String, to: String },

    /// The edge would point from an identity to itself
    #[error("identity {id} cannot depend on itself")]
    SelfReference { id: String },
}

/// Result type for DAG operations
pub type DagResult<T> = std::result::Result<T, DagError>;

/// Distinguishes real credential dependencies from wildcard-overlap
/// markers.
///
/// Match-only edges exist solely so ingestion-time cycle detection also
/// covers cycles that would only manifest through wildcard matching at
/// resolution time. Resolution never traverses them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum EdgeKind {
    /// A credential dependency encoded in configuration
    Data,
    /// A wildcard overlap detected during ingestion
    MatchOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
struct Edge {
    to: String,
    kind: EdgeKind,
}

#[derive(Debug, Clone)]
struct Vertex {
    identity: Identity,
    credentials: Option<CredentialMap>,
}

/// A clone-out view of a matched vertex, safe to hold after the graph
/// lock is released.
#[derive(Debug, Clone)]
pub struct MatchedVertex {
    /// Canonical string of the matched vertex
    pub canonical: String,
    /// The identity stored on the vertex (possibly pattern-bearing)
    pub identity: Identity,
    /// Cached credentials, if the vertex has been resolved before
    pub credentials: Option<CredentialMap>,
}

#[derive(Debug, Default)]
struct DagInner {
    vertices: BTreeMap<String, Vertex>,
    edges: BTreeMap<String, Vec<Edge>>,
}

impl DagInner {
    /// True when `target` is reachable from `start` over edges of any
    /// kind.
    fn reaches(&self, start: &str, target: &str) -> bool {
        let mut stack = vec![start.to_string()];
        let mut seen = BTreeSet::new();

        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(edges) = self.edges.get(&current) {
                for edge in edges {
                    stack.push(edge.to.clone());
                }
            }
        }

        false
    }

    fn insert_edge(&mut self, from: &str, to: &str, kind: EdgeKind) -> DagResult<()> {
        if from == to {
            return Err(DagError::SelfReference {
                id: from.to_string(),
            });
        }
        if self.reaches(to, from) {
            return Err(DagError::Cycle {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let edges = self.edges.entry(from.to_string()).or_default();
        let edge = Edge {
            to: to.to_string(),
            kind,
        };
        if !edges.contains(&edge) {
            debug!(%from, %to, ?kind, "adding edge");
            edges.push(edge);
        }
        Ok(())
    }
}

/// The synchronized identity DAG.
///
/// A single read-write lock guards the vertex and edge maps: lookups
/// and traversals take it shared, ingestion and memoization take it
/// exclusive briefly. The repository-configuration list sits behind its
/// own mutex so ingestion appends never block resolvers. All read
/// methods clone out of the lock, so callers never hold it across
/// plugin I/O.
#[derive(Debug, Default)]
pub struct IdentityDag {
    inner: RwLock<DagInner>,
    repositories: Mutex<Vec<TypedObject>>,
}

impl IdentityDag {
    /// Create an empty DAG.
    pub fn new() -> Self {
        Self::default()
    }

    // A poisoned lock means a reader or writer panicked elsewhere; the
    // maps themselves are still consistent, so recover the guard.
    fn read(&self) -> RwLockReadGuard<'_, DagInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, DagInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    fn repos(&self) -> MutexGuard<'_, Vec<TypedObject>> {
        self.repositories.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a vertex for the identity. Idempotent on the canonical
    /// string.
    ///
    /// On first insertion the new vertex is cross-checked against every
    /// existing vertex: wildcard overlap in either direction produces a
    /// match-only edge, which goes through the same cycle gate as data
    /// edges. Mutual overlap therefore surfaces as a `Cycle` error here
    /// rather than as runaway recursion at resolve time.
    pub fn add_vertex(&self, identity: Identity) -> DagResult<()> {
        let canonical = identity.canonical();
        let mut inner = self.write();

        if inner.vertices.contains_key(&canonical) {
            return Ok(());
        }
        debug!(identity = %canonical, "adding vertex");

        let existing: Vec<(String, Identity)> = inner
            .vertices
            .iter()
            .map(|(k, v)| (k.clone(), v.identity.clone()))
            .collect();

        inner.vertices.insert(
            canonical.clone(),
            Vertex {
                identity: identity.clone(),
                credentials: None,
            },
        );

        for (other_canonical, other_identity) in existing {
            if identity.matches(&other_identity) {
                inner.insert_edge(&other_canonical, &canonical, EdgeKind::MatchOnly)?;
            }
            if other_identity.matches(&identity) {
                inner.insert_edge(&canonical, &other_canonical, EdgeKind::MatchOnly)?;
            }
        }

        Ok(())
    }

    /// Add a directed edge between two existing vertices.
    ///
    /// Fails with `SelfReference` when both ends are the same vertex
    /// and with `Cycle` when the edge would close a cycle over edges of
    /// any kind.
    pub fn add_edge(&self, from: &Identity, to: &Identity, kind: EdgeKind) -> DagResult<()> {
        self.write()
            .insert_edge(&from.canonical(), &to.canonical(), kind)
    }

    /// Attach a resolved credential map to a vertex. No-op when the
    /// vertex is absent.
    pub fn set_credentials(&self, canonical: &str, credentials: CredentialMap) {
        let mut inner = self.write();
        if let Some(vertex) = inner.vertices.get_mut(canonical) {
            debug!(identity = %canonical, "caching credentials");
            vertex.credentials = Some(credentials);
        }
    }

    /// Cached credentials of a vertex, if any.
    pub fn credentials(&self, canonical: &str) -> Option<CredentialMap> {
        self.read()
            .vertices
            .get(canonical)
            .and_then(|v| v.credentials.clone())
    }

    /// The identity stored on a vertex.
    pub fn identity_of(&self, canonical: &str) -> Option<Identity> {
        self.read()
            .vertices
            .get(canonical)
            .map(|v| v.identity.clone())
    }

    /// Find the vertex matching the query identity.
    ///
    /// Exact canonical-string lookup first; on miss, a linear scan in
    /// canonical-string order returns the first vertex whose stored
    /// identity is matched by the query under the asymmetric wildcard
    /// rule. The sorted scan keeps results deterministic for a given
    /// graph.
    pub fn match_any_vertex(&self, query: &Identity) -> Option<MatchedVertex> {
        let inner = self.read();
        let canonical = query.canonical();

        if let Some(vertex) = inner.vertices.get(&canonical) {
            return Some(MatchedVertex {
                canonical,
                identity: vertex.identity.clone(),
                credentials: vertex.credentials.clone(),
            });
        }

        inner
            .vertices
            .iter()
            .find(|(_, vertex)| query.matches(&vertex.identity))
            .map(|(key, vertex)| MatchedVertex {
                canonical: key.clone(),
                identity: vertex.identity.clone(),
                credentials: vertex.credentials.clone(),
            })
    }

    /// Targets of the vertex's outgoing data edges. Match-only edges
    /// are never reported here.
    pub fn data_children(&self, canonical: &str) -> Vec<String> {
        let inner = self.read();
        inner
            .edges
            .get(canonical)
            .map(|edges| {
                edges
                    .iter()
                    .filter(|e| e.kind == EdgeKind::Data)
                    .map(|e| e.to.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of vertices.
    pub fn len(&self) -> usize {
        self.read().vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().vertices.is_empty()
    }

    /// Append a repository configuration consulted by indirect
    /// resolution.
    pub fn add_repository(&self, config: TypedObject) {
        self.repos().push(config);
    }

    /// Registered repository configurations, in registration order.
    pub fn repositories(&self) -> Vec<TypedObject> {
        self.repos().clone()
    }

    /// A deterministic structural view of the graph, for tests and
    /// debugging.
    pub fn snapshot(&self) -> DagSnapshot {
        let inner = self.read();

        let vertices = inner
            .vertices
            .iter()
            .map(|(canonical, vertex)| VertexSnapshot {
                canonical: canonical.clone(),
                credentials: vertex.credentials.clone(),
            })
            .collect();

        let mut edges: Vec<EdgeSnapshot> = inner
            .edges
            .iter()
            .flat_map(|(from, edges)| {
                edges.iter().map(move |edge| EdgeSnapshot {
                    from: from.clone(),
                    to: edge.to.clone(),
                    kind: edge.kind,
                })
            })
            .collect();
        edges.sort();

        DagSnapshot { vertices, edges }
    }
}

/// One vertex in a [`DagSnapshot`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VertexSnapshot {
    pub canonical: String,
    pub credentials: Option<CredentialMap>,
}

/// One edge in a [`DagSnapshot`]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct EdgeSnapshot {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
}

/// Structural view of the DAG in deterministic order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DagSnapshot {
    pub vertices: Vec<VertexSnapshot>,
    pub edges: Vec<EdgeSnapshot>,
}
