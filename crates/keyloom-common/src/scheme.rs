//! Type scheme: a registry mapping versioned type names to prototype
//! decoders.
//!
//! The scheme does not execute plugins. It only knows how to turn a raw
//! typed object into the registered prototype for that type, and it
//! iterates deterministically so two ingestions of the same
//! configuration produce the same result.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::TypeError;
use crate::types::{TypeName, TypedObject};

/// Decoder turning a raw typed object into its registered prototype.
pub type DecodeFn = Arc<dyn Fn(&TypedObject) -> Result<TypedObject, TypeError> + Send + Sync>;

/// Registry of known typed-object kinds keyed by type string.
///
/// Lookup tries the full versioned name first and falls back to the
/// base name, so `DockerConfig/v1` entries also serve unversioned
/// `DockerConfig` blobs and vice versa.
#[derive(Clone, Default)]
pub struct TypeScheme {
    entries: BTreeMap<String, DecodeFn>,
}

impl TypeScheme {
    /// Create an empty scheme.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register a decoder for a type name.
    pub fn register(&mut self, name: impl Into<TypeName>, decode: DecodeFn) {
        let name = name.into();
        debug!(ty = %name, "registering scheme type");
        self.entries.insert(name.to_string(), decode);
    }

    /// Register a type whose prototype is the raw object itself.
    pub fn register_raw(&mut self, name: impl Into<TypeName>) {
        self.register(name, Arc::new(|raw: &TypedObject| Ok(raw.clone())));
    }

    /// True when the scheme knows the given type, by full or base name.
    pub fn knows(&self, name: &TypeName) -> bool {
        self.entries.contains_key(&name.to_string()) || self.entries.contains_key(name.base())
    }

    /// Registered type names in deterministic order.
    pub fn type_names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    /// Convert a raw object into the registered prototype for its type.
    pub fn convert(&self, raw: &TypedObject) -> Result<TypedObject, TypeError> {
        let ty = raw.ty();
        if ty.is_empty() {
            return Err(TypeError::MissingType);
        }

        let decode = self
            .entries
            .get(&ty.to_string())
            .or_else(|| self.entries.get(ty.base()))
            .ok_or_else(|| TypeError::UnknownType(ty.to_string()))?;

        decode(raw)
    }
}

impl std::fmt::Debug for TypeScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeScheme")
            .field("types", &self.type_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(ty: &str) -> TypedObject {
        TypedObject::new(ty, json!({"field": "value"}))
    }

    #[test]
    fn convert_known_type() {
        let mut scheme = TypeScheme::new();
        scheme.register_raw("DockerConfig/v1");

        let out = scheme.convert(&raw("DockerConfig/v1")).unwrap();
        assert_eq!(out.ty().to_string(), "DockerConfig/v1");
    }

    #[test]
    fn convert_falls_back_to_base_name() {
        let mut scheme = TypeScheme::new();
        scheme.register_raw("DockerConfig");

        // A versioned blob is served by the unversioned registration.
        assert!(scheme.convert(&raw("DockerConfig/v1")).is_ok());
    }

    #[test]
    fn convert_unknown_type_fails() {
        let scheme = TypeScheme::new();
        let err = scheme.convert(&raw("Mystery")).unwrap_err();
        assert!(matches!(err, TypeError::UnknownType(t) if t == "Mystery"));
    }

    #[test]
    fn convert_empty_type_fails() {
        let mut scheme = TypeScheme::new();
        scheme.register_raw("DockerConfig");
        let err = scheme.convert(&raw("")).unwrap_err();
        assert!(matches!(err, TypeError::MissingType));
    }

    #[test]
    fn custom_decoder_can_reject() {
        let mut scheme = TypeScheme::new();
        scheme.register(
            "Strict/v1",
            Arc::new(|raw: &TypedObject| {
                if raw.str_field("field").is_some() {
                    Ok(raw.clone())
                } else {
                    Err(TypeError::Conversion {
                        ty: raw.ty().to_string(),
                        reason: "missing field".to_string(),
                    })
                }
            }),
        );

        assert!(scheme.convert(&raw("Strict/v1")).is_ok());
        let bare = TypedObject::new("Strict/v1", json!({}));
        assert!(scheme.convert(&bare).is_err());
    }

    #[test]
    fn type_names_are_sorted() {
        let mut scheme = TypeScheme::new();
        scheme.register_raw("Zeta");
        scheme.register_raw("Alpha");
        assert_eq!(scheme.type_names(), vec!["Alpha", "Zeta"]);
    }
}
