//! Merchant gateway settings.
//!
//! Credentials and signing secrets never reach the config store in clear:
//! each one is passed through the [`CredentialVault`] and only its ciphertext
//! is stored under `settings_<field>`. Plain switches are stored as
//! `yes`/`no`.

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::client::{query, Client, Credentials};
use crate::constants::SUPPORTED_CURRENCIES;
use crate::error::{BridgeError, Result};
use crate::store::ConfigStore;
use crate::transport::Transport;
use crate::vault::{CredentialVault, SecretScope};
use crate::webhook::{self, Environment, WebhookSecrets};

/// Fields stored through the vault.
pub const ENCRYPTED_FIELDS: [&str; 6] = [
    "test_app_id",
    "test_app_secret",
    "app_secret",
    "app_id",
    "webhook_secret",
    "test_webhook_secret",
];

const PLAIN_FIELDS: [&str; 3] = ["enabled", "enable_logo", "is_test"];

pub const MISSING_CREDENTIALS: &str = "Credentials invalid or not supplied";
pub const CURRENCY_UNSUPPORTED: &str = "Bridge payment only accepts Euro (EUR)";
pub const HTTPS_REQUIRED: &str = "The website does not seem to be using HTTPS (SSL/TLS) encryption for communications, you must use it to enable Bridge Payment in production mode";

fn option_key(field: &str) -> String {
    format!("settings_{field}")
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

/// Facts about the hosting site the settings are validated against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteContext {
    pub site_url: String,
    pub https: bool,
    pub permalinks: bool,
    pub currency: String,
    pub store_name: String,
}

impl SiteContext {
    pub fn currency_supported(&self) -> bool {
        SUPPORTED_CURRENCIES.contains(&self.currency.as_str())
    }
}

/// Gateway configuration with secrets in clear, as held in memory.
#[derive(Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct GatewaySettings {
    pub enabled: bool,
    pub enable_logo: bool,
    pub is_test: bool,
    pub app_id: String,
    pub app_secret: String,
    pub webhook_secret: String,
    pub test_app_id: String,
    pub test_app_secret: String,
    pub test_webhook_secret: String,
}

impl std::fmt::Debug for GatewaySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewaySettings")
            .field("enabled", &self.enabled)
            .field("enable_logo", &self.enable_logo)
            .field("is_test", &self.is_test)
            .field("app_id", &self.app_id)
            .field("test_app_id", &self.test_app_id)
            .finish_non_exhaustive()
    }
}

/// Result of [`GatewaySettings::load`]: fields that failed to decrypt load
/// as empty and are reported here.
#[derive(Debug, Clone)]
pub struct LoadedSettings {
    pub settings: GatewaySettings,
    pub load_errors: Vec<String>,
}

impl GatewaySettings {
    fn secret_field(&self, name: &str) -> Option<&str> {
        match name {
            "app_id" => Some(&self.app_id),
            "app_secret" => Some(&self.app_secret),
            "webhook_secret" => Some(&self.webhook_secret),
            "test_app_id" => Some(&self.test_app_id),
            "test_app_secret" => Some(&self.test_app_secret),
            "test_webhook_secret" => Some(&self.test_webhook_secret),
            _ => None,
        }
    }

    fn secret_field_mut(&mut self, name: &str) -> Option<&mut String> {
        match name {
            "app_id" => Some(&mut self.app_id),
            "app_secret" => Some(&mut self.app_secret),
            "webhook_secret" => Some(&mut self.webhook_secret),
            "test_app_id" => Some(&mut self.test_app_id),
            "test_app_secret" => Some(&mut self.test_app_secret),
            "test_webhook_secret" => Some(&mut self.test_webhook_secret),
            _ => None,
        }
    }

    fn flag(&self, name: &str) -> bool {
        match name {
            "enabled" => self.enabled,
            "enable_logo" => self.enable_logo,
            _ => self.is_test,
        }
    }

    fn set_flag(&mut self, name: &str, value: bool) {
        match name {
            "enabled" => self.enabled = value,
            "enable_logo" => self.enable_logo = value,
            _ => self.is_test = value,
        }
    }

    /// Persist. Non-empty secrets are re-encrypted with overwrite; empty ones
    /// are cleared along with their vault records.
    pub fn save(&self, config: &dyn ConfigStore, vault: &CredentialVault) -> Result<()> {
        for field in PLAIN_FIELDS {
            config.set(&option_key(field), yes_no(self.flag(field)))?;
        }

        for field in ENCRYPTED_FIELDS {
            let value = self.secret_field(field).unwrap_or_default();
            if value.is_empty() {
                config.delete(&option_key(field))?;
                vault.remove(field, SecretScope::Global)?;
                continue;
            }
            let ciphertext = vault.encrypt(value, field, true, SecretScope::Global)?;
            config.set(&option_key(field), &ciphertext)?;
        }

        tracing::info!(is_test = self.is_test, enabled = self.enabled, "gateway settings saved");
        Ok(())
    }

    /// Read back and decrypt. Missing keys load as defaults.
    pub fn load(config: &dyn ConfigStore, vault: &CredentialVault) -> Result<LoadedSettings> {
        let mut settings = GatewaySettings::default();
        let mut load_errors = Vec::new();

        for field in PLAIN_FIELDS {
            let value = config.get(&option_key(field))?;
            settings.set_flag(field, value.as_deref() == Some("yes"));
        }

        for field in ENCRYPTED_FIELDS {
            let Some(ciphertext) = config.get(&option_key(field))?.filter(|v| !v.is_empty())
            else {
                continue;
            };
            match vault.decrypt(&ciphertext, field, SecretScope::Global) {
                Ok(plain) => {
                    if let Some(slot) = settings.secret_field_mut(field) {
                        *slot = plain;
                    }
                }
                Err(e) => {
                    tracing::warn!(field, error = %e, "failed to decrypt gateway setting");
                    load_errors.push(format!("Error decrypting {field} key: {e}"));
                }
            }
        }

        Ok(LoadedSettings {
            settings,
            load_errors,
        })
    }

    pub fn active_environment(&self) -> Environment {
        Environment::from_sandbox_flag(self.is_test)
    }

    pub fn credentials_for(&self, env: Environment) -> Credentials {
        match env {
            Environment::Sandbox => Credentials::new(&self.test_app_id, &self.test_app_secret),
            Environment::Production => Credentials::new(&self.app_id, &self.app_secret),
        }
    }

    /// The pair selected by `is_test`.
    pub fn active_credentials(&self) -> Credentials {
        self.credentials_for(self.active_environment())
    }

    pub fn webhook_secrets(&self) -> WebhookSecrets {
        WebhookSecrets::new(&self.test_webhook_secret, &self.webhook_secret)
    }

    /// Messages about the hosting site; disables the gateway for an
    /// unsupported currency.
    pub fn site_notices(&mut self, site: &SiteContext) -> Vec<String> {
        let mut notices = Vec::new();
        if !site.currency_supported() {
            self.enabled = false;
            notices.push(CURRENCY_UNSUPPORTED.to_string());
        }
        if !site.https {
            notices.push(HTTPS_REQUIRED.to_string());
        }
        notices
    }

    /// Force sandbox mode unless production is allowed.
    pub fn enforce_mode(&mut self, production_allowed: bool) {
        if !production_allowed {
            self.is_test = true;
        }
    }

    /// Check the credentials of the selected mode against the provider.
    ///
    /// Returns user-facing messages, empty on success. Clears the webhook
    /// status of any environment left without credentials, and of the
    /// selected environment when the credential check fails.
    pub async fn validate<T, F>(
        &self,
        config: &dyn ConfigStore,
        make_client: F,
    ) -> Result<Vec<String>>
    where
        T: Transport,
        F: Fn(Credentials) -> Client<T>,
    {
        let mut messages = Vec::new();
        let env = self.active_environment();
        let has_credentials = self.credentials_for(env).is_complete();

        if !has_credentials {
            messages.push(MISSING_CREDENTIALS.to_string());
        }
        for other in [Environment::Production, Environment::Sandbox] {
            if !self.credentials_for(other).is_complete() {
                webhook::remove_webhook(config, other)?;
            }
        }

        if has_credentials {
            let mut client = make_client(self.credentials_for(env));
            if let Err(e) = client.resource("banks").list(query([("limit", "1")])).await {
                webhook::remove_webhook(config, env)?;
                tracing::warn!(%env, error = %e, "credential check failed");
                messages.push(format!("{MISSING_CREDENTIALS}: {}", error_text(&e)));
            }
        }

        Ok(messages)
    }

    /// Production requires HTTPS, both webhooks seen, a supported currency,
    /// all four credentials and a working live credential check.
    pub async fn can_enable_production<T, F>(
        &self,
        site: &SiteContext,
        config: &dyn ConfigStore,
        make_client: F,
    ) -> Result<bool>
    where
        T: Transport,
        F: Fn(Credentials) -> Client<T>,
    {
        if !site.https
            || webhook::webhook_configured(config, Environment::Sandbox)?.is_none()
            || webhook::webhook_configured(config, Environment::Production)?.is_none()
            || !site.currency_supported()
        {
            return Ok(false);
        }

        if !self.credentials_for(Environment::Production).is_complete()
            || !self.credentials_for(Environment::Sandbox).is_complete()
        {
            return Ok(false);
        }

        let mut client = make_client(self.credentials_for(Environment::Production));
        Ok(client
            .resource("banks")
            .list(query([("limit", "1")]))
            .await
            .is_ok())
    }
}

/// Provider errors already carry their prefix in `Display`; keep only the
/// message for notices.
pub fn error_text(e: &BridgeError) -> String {
    match e {
        BridgeError::Provider(msg) | BridgeError::Connection(msg) | BridgeError::Config(msg) => {
            msg.clone()
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::constants::ProviderConfig;
    use crate::store::{InMemoryConfigStore, InMemoryOrderStore};
    use crate::transport::mock::MockTransport;

    fn setup() -> (Arc<InMemoryConfigStore>, CredentialVault) {
        let config = Arc::new(InMemoryConfigStore::new());
        let vault = CredentialVault::new(config.clone(), Arc::new(InMemoryOrderStore::new()));
        vault.initialize_master_key().unwrap();
        (config, vault)
    }

    fn sample() -> GatewaySettings {
        GatewaySettings {
            enabled: true,
            enable_logo: false,
            is_test: true,
            app_id: "live-id".into(),
            app_secret: "live-secret".into(),
            webhook_secret: "live-wh".into(),
            test_app_id: "test-id".into(),
            test_app_secret: "test-secret".into(),
            test_webhook_secret: "test-wh".into(),
        }
    }

    fn site() -> SiteContext {
        SiteContext {
            site_url: "https://shop.test".into(),
            https: true,
            permalinks: true,
            currency: "EUR".into(),
            store_name: "Shop".into(),
        }
    }

    #[test]
    fn test_save_load_roundtrip_keeps_secrets_encrypted() {
        let (config, vault) = setup();
        sample().save(config.as_ref(), &vault).unwrap();

        let stored = config.get("settings_app_secret").unwrap().unwrap();
        assert_ne!(stored, "live-secret");
        assert_eq!(config.get("settings_is_test").unwrap().as_deref(), Some("yes"));
        assert!(config.get("_bridge_key_app_secret").unwrap().is_some());

        let loaded = GatewaySettings::load(config.as_ref(), &vault).unwrap();
        assert!(loaded.load_errors.is_empty());
        assert_eq!(loaded.settings, sample());
    }

    #[test]
    fn test_resave_overwrites() {
        let (config, vault) = setup();
        sample().save(config.as_ref(), &vault).unwrap();
        let mut changed = sample();
        changed.app_secret = "rotated".into();
        changed.save(config.as_ref(), &vault).unwrap();

        let loaded = GatewaySettings::load(config.as_ref(), &vault).unwrap();
        assert_eq!(loaded.settings.app_secret, "rotated");
    }

    #[test]
    fn test_cleared_secret_drops_vault_record() {
        let (config, vault) = setup();
        sample().save(config.as_ref(), &vault).unwrap();
        assert!(config.get("_bridge_key_app_secret").unwrap().is_some());

        let mut cleared = sample();
        cleared.app_secret.clear();
        cleared.save(config.as_ref(), &vault).unwrap();

        assert_eq!(config.get("settings_app_secret").unwrap(), None);
        assert_eq!(config.get("_bridge_key_app_secret").unwrap(), None);
        assert!(!vault.exists("app_secret", SecretScope::Global).unwrap());
        assert!(config.get("_bridge_key_app_id").unwrap().is_some());

        let loaded = GatewaySettings::load(config.as_ref(), &vault).unwrap();
        assert!(loaded.load_errors.is_empty());
        assert_eq!(loaded.settings.app_secret, "");
    }

    #[test]
    fn test_undecryptable_field_loads_empty_with_error() {
        let (config, vault) = setup();
        sample().save(config.as_ref(), &vault).unwrap();
        config.set("settings_app_id", "AAAA").unwrap();

        let loaded = GatewaySettings::load(config.as_ref(), &vault).unwrap();
        assert_eq!(loaded.settings.app_id, "");
        assert_eq!(loaded.load_errors.len(), 1);
        assert!(loaded.load_errors[0].contains("app_id"));
    }

    #[test]
    fn test_active_credentials_follow_mode() {
        let mut s = sample();
        assert_eq!(s.active_credentials().id(), "test-id");
        s.is_test = false;
        assert_eq!(s.active_credentials().id(), "live-id");
        assert_eq!(s.webhook_secrets().for_env(Environment::Sandbox), "test-wh");
    }

    #[test]
    fn test_site_notices() {
        let mut s = sample();
        let mut ctx = site();
        ctx.currency = "USD".into();
        ctx.https = false;
        let notices = s.site_notices(&ctx);
        assert_eq!(notices, vec![CURRENCY_UNSUPPORTED, HTTPS_REQUIRED]);
        assert!(!s.enabled);
    }

    #[tokio::test]
    async fn test_validate_missing_credentials_skips_check() {
        let (config, _) = setup();
        webhook::configure_webhook(config.as_ref(), Environment::Sandbox).unwrap();
        let transport = Arc::new(MockTransport::new());
        let mut s = sample();
        s.test_app_secret.clear();

        let messages = s
            .validate(config.as_ref(), |c| {
                Client::new(transport.clone(), c, ProviderConfig::default())
            })
            .await
            .unwrap();

        assert_eq!(messages, vec![MISSING_CREDENTIALS]);
        assert_eq!(transport.calls(), 0);
        assert!(webhook::webhook_configured(config.as_ref(), Environment::Sandbox)
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_validate_check_failure_clears_webhook() {
        let (config, _) = setup();
        webhook::configure_webhook(config.as_ref(), Environment::Sandbox).unwrap();
        let transport =
            Arc::new(MockTransport::new().respond_json(401, json!({"message": "Invalid client"})));

        let messages = sample()
            .validate(config.as_ref(), |c| {
                Client::new(transport.clone(), c, ProviderConfig::default())
            })
            .await
            .unwrap();

        assert_eq!(messages, vec![format!("{MISSING_CREDENTIALS}: Invalid client")]);
        assert!(webhook::webhook_configured(config.as_ref(), Environment::Sandbox)
            .unwrap()
            .is_none());
        let req = &transport.requests()[0];
        assert_eq!(req.header("Client-Id"), Some("test-id"));
        assert!(req.url.ends_with("/banks?limit=1"));
    }

    #[tokio::test]
    async fn test_can_enable_production() {
        let (config, _) = setup();
        let s = sample();

        let transport = Arc::new(MockTransport::new().respond_json(200, json!({"resources": []})));
        let factory = |c| Client::new(transport.clone(), c, ProviderConfig::default());

        assert!(!s.can_enable_production(&site(), config.as_ref(), factory).await.unwrap());
        assert_eq!(transport.calls(), 0);

        webhook::configure_webhook(config.as_ref(), Environment::Sandbox).unwrap();
        webhook::configure_webhook(config.as_ref(), Environment::Production).unwrap();

        let mut http_site = site();
        http_site.https = false;
        assert!(!s.can_enable_production(&http_site, config.as_ref(), factory).await.unwrap());

        assert!(s.can_enable_production(&site(), config.as_ref(), factory).await.unwrap());
        assert_eq!(transport.requests()[0].header("Client-Id"), Some("live-id"));
    }

    #[test]
    fn test_enforce_mode() {
        let mut s = sample();
        s.is_test = false;
        s.enforce_mode(true);
        assert!(!s.is_test);
        s.enforce_mode(false);
        assert!(s.is_test);
    }
}
