use thiserror::Error;

/// Errors returned by bridgepay operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The provider could not be reached (DNS, TLS, timeout, reset).
    #[error("connection error: {0}")]
    Connection(String),

    /// The provider answered with a non-200 status.
    #[error("Bridge Error: {0}")]
    Provider(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The order is already paid or closed.
    #[error("order not payable: {0}")]
    NotPayable(String),

    /// A stored record could not be unpacked.
    #[error("decode error: {0}")]
    Decode(String),

    /// An external store failed underneath us.
    #[error("store error: {0}")]
    Store(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl BridgeError {
    /// Only transport failures are worth retrying unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BridgeError::Connection(_))
    }
}

#[cfg(feature = "full")]
impl From<rusqlite::Error> for BridgeError {
    fn from(e: rusqlite::Error) -> Self {
        BridgeError::Store(e.to_string())
    }
}

pub type Result<T, E = BridgeError> = std::result::Result<T, E>;
