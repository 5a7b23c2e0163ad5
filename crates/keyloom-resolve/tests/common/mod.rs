//! Shared test doubles: a Vault-flavored credential plugin and the
//! chain configuration used across the integration suites.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use keyloom_resolve::{
    CredentialMap, CredentialPlugin, GraphOptions, Identity, PluginError, TypedObject,
    ATTR_HOSTNAME,
};

/// A three-hop chain: docker.io behind other.vault.com behind
/// myvault.example.com behind bootstrap approle credentials, plus a
/// wildcard-scoped quay.io consumer with direct credentials.
pub const CHAIN_CONFIG: &str = r#"
type: credentials.config.keyloom/v1
consumers:
  - identity:
      type: OCIRegistry
      hostname: docker.io
    credentials:
      - type: HashiCorpVault
        serverURL: "https://other.vault.com/"
  - identity:
      type: HashiCorpVault
      hostname: other.vault.com
    credentials:
      - type: HashiCorpVault
        serverURL: "https://myvault.example.com/"
  - identity:
      type: HashiCorpVault
      hostname: myvault.example.com
    credentials:
      - type: Credentials
        properties:
          role_id: "rid"
          secret_id: "sid"
  - identity:
      type: OCIRegistry
      hostname: quay.io
      path: "acme/*"
    credentials:
      - type: Credentials
        properties:
          username: acme
          password: pw
"#;

/// Build a credential map from literal pairs.
pub fn creds(pairs: &[(&str, &str)]) -> CredentialMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Hostname portion of a vault server URL.
pub fn hostname_of(url: &str) -> String {
    url.trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .to_string()
}

/// Credential plugin for `HashiCorpVault` credentials.
///
/// Translates a credential blob into the vault server's identity and
/// transforms resolved child credentials per vault host: the bootstrap
/// approle yields a second-stage approle for myvault, which in turn
/// yields user/pass for other.vault.com.
pub struct VaultPlugin {
    pub resolve_calls: AtomicUsize,
}

impl VaultPlugin {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            resolve_calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialPlugin for VaultPlugin {
    fn consumer_identity(&self, credential: &TypedObject) -> Result<Identity, PluginError> {
        let url = credential
            .str_field("serverURL")
            .ok_or_else(|| PluginError::new("vault credential missing serverURL"))?;
        Ok(Identity::new("HashiCorpVault").with_attr(ATTR_HOSTNAME, hostname_of(url)))
    }

    async fn resolve(
        &self,
        _token: &CancellationToken,
        child: &Identity,
        child_credentials: &CredentialMap,
    ) -> Result<CredentialMap, PluginError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);

        let role = child_credentials.get("role_id").map(String::as_str);
        match child.attr(ATTR_HOSTNAME) {
            Some("myvault.example.com") if role == Some("rid") => {
                Ok(creds(&[("role_id", "rid2"), ("secret_id", "sid2")]))
            }
            Some("other.vault.com") if role == Some("rid2") => {
                Ok(creds(&[("user", "u"), ("pass", "p")]))
            }
            _ => Err(PluginError::new(format!("no approle for {child}"))),
        }
    }
}

/// Options wiring the vault plugin as the only credential plugin.
pub fn chain_options(vault: Arc<VaultPlugin>) -> GraphOptions {
    GraphOptions {
        credential_plugins: Arc::new(move |ty| {
            (ty.base() == "HashiCorpVault")
                .then(|| Arc::clone(&vault) as Arc<dyn CredentialPlugin>)
        }),
        ..GraphOptions::default()
    }
}
