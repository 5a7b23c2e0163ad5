//! Versioned type names and the generic typed-object representation.

use std::fmt;

use serde::de::{Deserializer, Error as DeError, MapAccess, Visitor};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Key carrying the type discriminator inside a typed blob
pub const TYPE_FIELD: &str = "type";

/// A possibly versioned type name such as `Credentials` or `Credentials/v1`.
///
/// The version suffix is recognized as `/v<digits>`. Anything else is
/// treated as part of the base name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeName {
    base: String,
    version: Option<String>,
}

impl TypeName {
    /// Parse a type string into base name and optional version.
    pub fn new(s: impl Into<String>) -> Self {
        let s = s.into();
        match s.rsplit_once('/') {
            Some((base, version))
                if version.len() > 1
                    && version.starts_with('v')
                    && version[1..].chars().all(|c| c.is_ascii_digit()) =>
            {
                Self {
                    base: base.to_string(),
                    version: Some(version.to_string()),
                }
            }
            _ => Self {
                base: s,
                version: None,
            },
        }
    }

    /// Base name without the version suffix.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Version suffix, if present (e.g. `v1`).
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// True when the base name is empty.
    pub fn is_empty(&self) -> bool {
        self.base.is_empty()
    }

    /// True when `other` names the same base, regardless of version.
    pub fn same_base(&self, other: &TypeName) -> bool {
        self.base == other.base
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}/{}", self.base, v),
            None => write!(f, "{}", self.base),
        }
    }
}

impl From<&str> for TypeName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl Serialize for TypeName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TypeName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::new(s))
    }
}

/// A typed blob: a type name plus the remaining fields of the object.
///
/// This is the raw representation used for credentials and repository
/// configurations whose concrete schema is owned by a plugin. All
/// fields other than `type` are preserved verbatim in `value`, so
/// plugin-defined types round-trip through the core untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedObject {
    ty: TypeName,
    value: Value,
}

impl TypedObject {
    /// Build a typed object from a type name and a payload value.
    pub fn new(ty: impl Into<TypeName>, value: Value) -> Self {
        Self {
            ty: ty.into(),
            value,
        }
    }

    pub fn ty(&self) -> &TypeName {
        &self.ty
    }

    /// Payload without the type discriminator.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Fetch a string field from the payload.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(Value::as_str)
    }
}

impl Serialize for TypedObject {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = self.value.as_object();
        let len = 1 + fields.map_or(0, |m| m.len());
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry(TYPE_FIELD, &self.ty)?;
        if let Some(fields) = fields {
            for (k, v) in fields {
                map.serialize_entry(k, v)?;
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for TypedObject {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TypedObjectVisitor;

        impl<'de> Visitor<'de> for TypedObjectVisitor {
            type Value = TypedObject;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map with a `type` field")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut ty: Option<TypeName> = None;
                let mut fields = serde_json::Map::new();

                while let Some(key) = access.next_key::<String>()? {
                    if key == TYPE_FIELD {
                        let raw: Value = access.next_value()?;
                        let s = raw
                            .as_str()
                            .ok_or_else(|| A::Error::custom("`type` must be a string"))?;
                        ty = Some(TypeName::new(s));
                    } else {
                        fields.insert(key, access.next_value()?);
                    }
                }

                // Ingestion decides whether an absent or empty type is
                // fatal, so a missing discriminator parses as empty here.
                Ok(TypedObject {
                    ty: ty.unwrap_or_else(|| TypeName::new("")),
                    value: Value::Object(fields),
                })
            }
        }

        deserializer.deserialize_map(TypedObjectVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn type_name_parses_version_suffix() {
        let t = TypeName::new("Credentials/v1");
        assert_eq!(t.base(), "Credentials");
        assert_eq!(t.version(), Some("v1"));
        assert_eq!(t.to_string(), "Credentials/v1");
    }

    #[test]
    fn type_name_without_version() {
        let t = TypeName::new("HashiCorpVault");
        assert_eq!(t.base(), "HashiCorpVault");
        assert_eq!(t.version(), None);
    }

    #[test]
    fn type_name_ignores_non_version_suffix() {
        let t = TypeName::new("acme/repo");
        assert_eq!(t.base(), "acme/repo");
        assert_eq!(t.version(), None);
    }

    #[test]
    fn same_base_across_versions() {
        assert!(TypeName::new("Credentials/v1").same_base(&TypeName::new("Credentials")));
        assert!(!TypeName::new("Credentials").same_base(&TypeName::new("DockerConfig")));
    }

    #[test]
    fn typed_object_roundtrip_preserves_unknown_fields() {
        let doc = json!({
            "type": "HashiCorpVault/v1",
            "serverURL": "https://vault.example.com/",
            "extra": {"nested": true},
        });

        let obj: TypedObject = serde_json::from_value(doc.clone()).unwrap();
        assert_eq!(obj.ty().base(), "HashiCorpVault");
        assert_eq!(obj.str_field("serverURL"), Some("https://vault.example.com/"));

        let back = serde_json::to_value(&obj).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn typed_object_from_yaml() {
        let obj: TypedObject =
            serde_yaml::from_str("type: DockerConfig/v1\ndockerConfigFile: ~/.docker/config.json\n")
                .unwrap();
        assert_eq!(obj.ty().to_string(), "DockerConfig/v1");
        assert_eq!(obj.str_field("dockerConfigFile"), Some("~/.docker/config.json"));
    }

    #[test]
    fn typed_object_missing_type_parses_empty() {
        let obj: TypedObject = serde_json::from_value(json!({"a": 1})).unwrap();
        assert!(obj.ty().is_empty());
    }
}
