//! Server configuration from environment variables.
//!
//! `main` loads `.env` through dotenvy first, then calls
//! [`ServerConfig::from_env`]. Parsing goes through [`ServerConfig::from_lookup`]
//! so tests can feed variables without touching the process environment.

use std::time::Duration;

use bridgepay::settings::SiteContext;
use bridgepay::{BridgeError, ProviderConfig};

#[derive(Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub db_path: String,
    pub provider: ProviderConfig,
    pub site: SiteContext,
    /// Bearer token for `/admin/*` and `/metrics`. Admin routes are closed
    /// when unset.
    pub admin_token: Option<Vec<u8>>,
    pub public_metrics: bool,
    pub rate_limit_rpm: u64,
    pub allowed_origins: Vec<String>,
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("port", &self.port)
            .field("db_path", &self.db_path)
            .field("provider", &self.provider)
            .field("site", &self.site)
            .field("admin_token_set", &self.admin_token.is_some())
            .field("public_metrics", &self.public_metrics)
            .field("rate_limit_rpm", &self.rate_limit_rpm)
            .field("allowed_origins", &self.allowed_origins)
            .finish()
    }
}

fn flag(value: Option<String>, default: bool) -> bool {
    match value.as_deref().map(str::trim) {
        Some("true") | Some("1") | Some("yes") => true,
        Some("false") | Some("0") | Some("no") => false,
        _ => default,
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, BridgeError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, BridgeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let port = match var("PORT") {
            Some(p) => p
                .trim()
                .parse()
                .map_err(|_| BridgeError::Config(format!("invalid PORT: {p}")))?,
            None => 4030,
        };

        let mut provider = ProviderConfig::default();
        if let Some(base_url) = var("BRIDGE_API_BASE_URL") {
            provider = provider.with_base_url(base_url);
        }
        if let Some(secs) = var("BRIDGE_API_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                BridgeError::Config(format!("invalid BRIDGE_API_TIMEOUT_SECS: {secs}"))
            })?;
            provider.timeout = Duration::from_secs(secs);
        }

        let site_url = var("SITE_URL").unwrap_or_else(|| format!("http://localhost:{port}"));
        let https = match var("SITE_HTTPS") {
            Some(v) => flag(Some(v), false),
            None => site_url.starts_with("https://"),
        };

        let site = SiteContext {
            https,
            permalinks: flag(var("SITE_PERMALINKS"), true),
            currency: var("STORE_CURRENCY").unwrap_or_else(|| "EUR".to_string()),
            store_name: var("STORE_NAME").unwrap_or_default(),
            site_url: site_url.trim_end_matches('/').to_string(),
        };

        let rate_limit_rpm = var("RATE_LIMIT_RPM")
            .and_then(|r| r.trim().parse().ok())
            .unwrap_or(120);

        let allowed_origins = var("ALLOWED_ORIGINS")
            .map(|origins| {
                origins
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            port,
            db_path: var("BRIDGE_DB_PATH").unwrap_or_else(|| "./bridgepay.db".to_string()),
            provider,
            site,
            admin_token: var("ADMIN_TOKEN").map(String::into_bytes),
            public_metrics: flag(var("BRIDGE_PUBLIC_METRICS"), false),
            rate_limit_rpm,
            allowed_origins,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ServerConfig, BridgeError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults() {
        let c = config(&[]).unwrap();
        assert_eq!(c.port, 4030);
        assert_eq!(c.db_path, "./bridgepay.db");
        assert_eq!(c.provider.base_url, "https://api.bridgeapi.io/v2");
        assert_eq!(c.site.currency, "EUR");
        assert!(c.site.permalinks);
        assert!(!c.site.https);
        assert!(c.admin_token.is_none());
        assert_eq!(c.rate_limit_rpm, 120);
    }

    #[test]
    fn overrides() {
        let c = config(&[
            ("PORT", "8080"),
            ("BRIDGE_API_BASE_URL", "http://127.0.0.1:9999/v2/"),
            ("BRIDGE_API_TIMEOUT_SECS", "5"),
            ("SITE_URL", "https://shop.test/"),
            ("SITE_PERMALINKS", "false"),
            ("ADMIN_TOKEN", "tok"),
            ("ALLOWED_ORIGINS", "https://a.test, https://b.test"),
        ])
        .unwrap();
        assert_eq!(c.port, 8080);
        assert_eq!(c.provider.base_url, "http://127.0.0.1:9999/v2");
        assert_eq!(c.provider.timeout, Duration::from_secs(5));
        assert_eq!(c.site.site_url, "https://shop.test");
        assert!(c.site.https);
        assert!(!c.site.permalinks);
        assert_eq!(c.admin_token.as_deref(), Some(&b"tok"[..]));
        assert_eq!(c.allowed_origins.len(), 2);
    }

    #[test]
    fn invalid_port_is_config_error() {
        assert!(matches!(
            config(&[("PORT", "not-a-port")]),
            Err(BridgeError::Config(_))
        ));
    }

    #[test]
    fn debug_hides_admin_token() {
        let c = config(&[("ADMIN_TOKEN", "super-secret-token")]).unwrap();
        assert!(!format!("{c:?}").contains("super-secret-token"));
    }
}
