use std::time::Duration;

/// Production API base URL.
pub const BASE_URL: &str = "https://api.bridgeapi.io/v2";

/// Date-versioned API contract the client speaks.
pub const API_VERSION: &str = "2021-06-01";

/// Header carrying [`API_VERSION`] on every outbound call.
pub const VERSION_HEADER: &str = "Bridge-Version";

/// Header carrying the webhook signature list on inbound notifications.
pub const SIGNATURE_HEADER: &str = "bridgeapi-signature";

/// Routing value identifying a transaction-updated notification.
pub const WEBHOOK_ROUTE: &str = "transaction-updated";

/// Notification `type` for payment transaction updates.
pub const EVENT_TRANSACTION_UPDATED: &str = "payment.transaction.updated";

/// Notification `type` sent by the dashboard "test webhook" button.
pub const EVENT_TEST: &str = "TEST_EVENT";

/// Cipher used for every vault record.
pub const CIPHER_NAME: &str = "aes-256-gcm";

/// Config key holding the base64 master key.
pub const MASTER_KEY_OPTION: &str = "bridge_key";

/// Namespace prefix for vault record keys.
pub const VAULT_KEY_PREFIX: &str = "_bridge_key_";

/// Config keys recording the last verified webhook per environment.
pub const WEBHOOK_SET_OPTION: &str = "bridge_webhook_set";
pub const SANDBOX_WEBHOOK_SET_OPTION: &str = "bridge_sandbox_webhook_set";

/// Order metadata key holding the encrypted payment request id.
pub const PAYMENT_LINK_META: &str = "bridge_payment_link_id";

/// Vault logical key for the payment request id.
pub const PAYMENT_REQUEST_ID_KEY: &str = "payment_request_id";

/// Currencies the provider settles.
pub const SUPPORTED_CURRENCIES: &[&str] = &["EUR"];

/// Bank ids never offered at checkout.
pub const IGNORED_BANK_IDS: &[u64] = &[152, 179];

/// Default request timeout for provider calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Runtime provider configuration. Lets tests and sandbox deployments point
/// the client somewhere other than the production API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_version: String,
    pub timeout: Duration,
}

impl ProviderConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: BASE_URL.to_string(),
            api_version: API_VERSION.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}
