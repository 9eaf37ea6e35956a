use std::sync::Arc;

use bridgepay::{
    BridgeError, Client, ConfigStore, CredentialVault, Credentials, Gateway, GatewaySettings,
    OrderStore, ReqwestTransport, SqliteStore,
};

use crate::config::ServerConfig;

/// Shared application state. Holds store handles only; every request builds
/// its own provider [`Client`].
pub struct AppState {
    pub config: ServerConfig,
    pub options: Arc<dyn ConfigStore>,
    pub orders: Arc<dyn OrderStore>,
    pub vault: CredentialVault,
    pub gateway: Gateway,
    transport: ReqwestTransport,
}

impl AppState {
    /// Wire the state over the given stores and make sure a master key
    /// exists.
    pub fn new(
        config: ServerConfig,
        options: Arc<dyn ConfigStore>,
        orders: Arc<dyn OrderStore>,
    ) -> Result<Self, BridgeError> {
        let vault = CredentialVault::new(options.clone(), orders.clone());
        vault.ensure_master_key()?;
        let gateway = Gateway::new(orders.clone(), options.clone(), vault.clone());
        let transport = ReqwestTransport::new(config.provider.timeout)?;

        Ok(Self {
            config,
            options,
            orders,
            vault,
            gateway,
            transport,
        })
    }

    /// State backed by the SQLite database at `config.db_path`.
    pub fn open(config: ServerConfig) -> Result<Self, BridgeError> {
        let store = Arc::new(SqliteStore::open(&config.db_path)?);
        Self::new(config, store.clone(), store)
    }

    /// Current gateway settings. Fields that fail to decrypt load empty and
    /// are logged.
    pub fn settings(&self) -> Result<GatewaySettings, BridgeError> {
        let loaded = GatewaySettings::load(self.options.as_ref(), &self.vault)?;
        for error in &loaded.load_errors {
            tracing::error!(error = %error, "gateway setting unreadable");
        }
        Ok(loaded.settings)
    }

    pub fn client(&self, credentials: Credentials) -> Client<ReqwestTransport> {
        Client::new(
            self.transport.clone(),
            credentials,
            self.config.provider.clone(),
        )
    }
}
