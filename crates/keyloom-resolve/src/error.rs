//! Error taxonomy surfaced by credential resolution.
//!
//! Ingestion errors short-circuit graph construction. Resolution errors
//! are per-request; the graph stays valid and usable after any of them.
//! `NoDirectCredentials` doubles as the signal for the direct-to-
//! indirect transition and is therefore stable and matchable.

use thiserror::Error;

use keyloom_common::TypeError;
use keyloom_dag::DagError;

use crate::plugin::PluginError;

/// Result type for resolution operations
pub type ResolveResult<T> = std::result::Result<T, ResolveError>;

/// Errors that can occur during ingestion and resolution
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Malformed ingestion input
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Cycle or self-reference detected while building the graph
    #[error(transparent)]
    Dag(#[from] DagError),

    /// The request identity carries no `type` attribute
    #[error("invalid identity: missing `type` attribute")]
    InvalidIdentity,

    /// No credential chain exists in the graph; indirect resolution is
    /// the intended next step
    #[error("no direct credentials found")]
    NoDirectCredentials,

    /// A matched vertex has more than one credential dependency
    #[error("identity {identity} has {count} credential dependencies, expected exactly one")]
    AmbiguousGraph { identity: String, count: usize },

    /// Wildcard matching led the descent back to an already visited
    /// vertex
    #[error("wildcard matching led back to {identity} during resolution")]
    UnresolvedCycle { identity: String },

    /// No credential plugin is registered for a credential type
    #[error("no credential plugin for type {0}")]
    MissingCredentialPlugin(String),

    /// No repository plugin for the identity type or the fallback
    /// sentinel
    #[error("no repository plugin for types [{}]", .tried.join(", "))]
    NoResolver { tried: Vec<String> },

    /// Every indirect worker failed; one cause per worker, in
    /// repository-registration order
    #[error("indirect resolution failed: [{}]", .causes.join("; "))]
    IndirectResolution { causes: Vec<String> },

    /// The caller's cancellation token fired
    #[error("resolution cancelled")]
    Cancelled,

    /// A plugin call failed, carrying the identity it was invoked for
    #[error("plugin failure for {identity}: {source}")]
    Plugin {
        identity: String,
        #[source]
        source: PluginError,
    },

    /// Typed-object conversion failed during repository registration
    #[error(transparent)]
    Type(#[from] TypeError),
}
