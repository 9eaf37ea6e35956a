//! Inbound webhook authentication and webhook status bookkeeping.
//!
//! The provider signs every notification body with HMAC-SHA256 under the
//! merchant's per-environment signing secret and sends the digest in the
//! `BridgeApi-Signature` header as `v1=<HEX>[,v1=<HEX>]`. Two entries can be
//! present while a secret is being rotated.
//!
//! [`WebhookAuthenticator::is_authentic`] never errors. Every failure mode
//! collapses to `false` so an unauthenticated caller learns nothing about
//! why it was turned away.

use std::time::{SystemTime, UNIX_EPOCH};

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::constants::{
    SANDBOX_WEBHOOK_SET_OPTION, SIGNATURE_HEADER, WEBHOOK_ROUTE, WEBHOOK_SET_OPTION,
};
use crate::error::Result;
use crate::hmac::verify_signature;
use crate::store::ConfigStore;

/// Maximum number of signature entries honoured per header.
pub const MAX_SIGNATURES: usize = 2;

/// Provider environment a notification or credential set belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Environment {
    Sandbox,
    Production,
}

impl Environment {
    pub fn from_sandbox_flag(sandbox: bool) -> Self {
        if sandbox {
            Environment::Sandbox
        } else {
            Environment::Production
        }
    }

    pub fn is_sandbox(&self) -> bool {
        matches!(self, Environment::Sandbox)
    }

    /// Config key recording when this environment's webhook was last seen.
    pub fn status_option(&self) -> &'static str {
        match self {
            Environment::Sandbox => SANDBOX_WEBHOOK_SET_OPTION,
            Environment::Production => WEBHOOK_SET_OPTION,
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Sandbox => f.write_str("sandbox"),
            Environment::Production => f.write_str("production"),
        }
    }
}

/// What the front controller knows about an inbound request.
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    pub method: String,
    /// The `bridge-status` routing value, from the path or the query.
    pub route: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl InboundRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Per-environment signing secrets. Empty means "not configured".
#[derive(Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct WebhookSecrets {
    pub sandbox: String,
    pub production: String,
}

impl WebhookSecrets {
    pub fn new(sandbox: impl Into<String>, production: impl Into<String>) -> Self {
        Self {
            sandbox: sandbox.into(),
            production: production.into(),
        }
    }

    pub fn for_env(&self, env: Environment) -> &str {
        match env {
            Environment::Sandbox => &self.sandbox,
            Environment::Production => &self.production,
        }
    }
}

impl std::fmt::Debug for WebhookSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSecrets")
            .field("sandbox_set", &!self.sandbox.is_empty())
            .field("production_set", &!self.production.is_empty())
            .finish()
    }
}

/// One `version=digest` entry of the signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureEntry {
    pub version: String,
    pub digest: String,
}

/// Parse at most [`MAX_SIGNATURES`] comma-separated entries. Each entry is a
/// form-encoded fragment; the `v1` pair wins when several pairs share an
/// entry. Entries past the limit are ignored.
pub fn parse_signature_header(header: &str) -> Vec<SignatureEntry> {
    header
        .split(',')
        .take(MAX_SIGNATURES)
        .filter_map(|entry| {
            let pairs: Vec<(String, String)> =
                url::form_urlencoded::parse(entry.trim().as_bytes())
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect();
            let (version, digest) = pairs
                .iter()
                .find(|(k, _)| k == "v1")
                .or_else(|| pairs.first())
                .cloned()?;
            Some(SignatureEntry { version, digest })
        })
        .collect()
}

/// Decides whether an inbound notification really comes from the provider.
#[derive(Debug, Clone)]
pub struct WebhookAuthenticator {
    secrets: WebhookSecrets,
}

impl WebhookAuthenticator {
    pub fn new(secrets: WebhookSecrets) -> Self {
        Self { secrets }
    }

    /// `true` only for a POST routed to `transaction-updated`, carrying a
    /// signature header, for an environment with a configured secret, where
    /// one of the first two `v1` digests matches the body HMAC.
    pub fn is_authentic(&self, request: &InboundRequest, env: Environment) -> bool {
        if !request.method.eq_ignore_ascii_case("POST") {
            return false;
        }
        if request.route.as_deref() != Some(WEBHOOK_ROUTE) {
            return false;
        }
        let Some(header) = request.header(SIGNATURE_HEADER).filter(|h| !h.is_empty()) else {
            return false;
        };
        let secret = self.secrets.for_env(env);
        if secret.is_empty() {
            return false;
        }

        parse_signature_header(header)
            .iter()
            .filter(|entry| entry.version == "v1" && !entry.digest.is_empty())
            .any(|entry| verify_signature(secret.as_bytes(), &request.body, &entry.digest))
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Record that `env`'s webhook has just been seen working.
pub fn configure_webhook(config: &dyn ConfigStore, env: Environment) -> Result<()> {
    config.set(env.status_option(), &unix_now().to_string())?;
    tracing::info!(%env, "webhook marked configured");
    Ok(())
}

/// Forget `env`'s webhook status.
pub fn remove_webhook(config: &dyn ConfigStore, env: Environment) -> Result<()> {
    config.delete(env.status_option())
}

/// Unix timestamp of the last verified webhook for `env`, if any.
pub fn webhook_configured(config: &dyn ConfigStore, env: Environment) -> Result<Option<u64>> {
    Ok(config
        .get(env.status_option())?
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|ts| *ts > 0))
}

/// The URL the merchant registers in the provider dashboard.
pub fn webhook_url(site_url: &str, permalinks: bool, env: Environment) -> String {
    let site = site_url.trim_end_matches('/');
    match (permalinks, env) {
        (true, Environment::Production) => format!("{site}/bridge-webhook/{WEBHOOK_ROUTE}"),
        (true, Environment::Sandbox) => format!("{site}/bridge-webhook/{WEBHOOK_ROUTE}?sandbox"),
        (false, Environment::Production) => format!("{site}/?bridge-status={WEBHOOK_ROUTE}"),
        (false, Environment::Sandbox) => format!("{site}/?bridge-status={WEBHOOK_ROUTE}&sandbox"),
    }
}
