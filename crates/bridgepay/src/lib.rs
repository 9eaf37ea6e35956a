//! Bridge bank-transfer payments for an e-commerce checkout.
//!
//! Lists eligible banks, sends the buyer to the provider to authorise a
//! transfer, and reconciles order status from signed server-to-server
//! notifications.
//!
//! # Trust boundary
//!
//! - **Client** ([`Client`]): provider REST calls with per-call credentials,
//!   following multi-page result sets
//! - **Vault** ([`CredentialVault`]): provider secrets encrypted at rest,
//!   scoped globally or to one order
//! - **Authenticator** ([`WebhookAuthenticator`]): HMAC check of inbound
//!   notifications before any order is touched
//!
//! Storage is behind [`ConfigStore`] and [`OrderStore`]; the HTTP transport
//! is behind [`Transport`].

// Core types
pub mod constants;
pub mod error;
pub mod hmac;
pub mod security;

// Encryption at rest
pub mod crypto;
pub mod store;
pub mod vault;

// Provider API
pub mod client;
pub mod transport;

// Inbound notifications
pub mod webhook;

// Checkout flows
pub mod banks;
pub mod gateway;
pub mod settings;

// Re-exports
pub use constants::*;
pub use error::{BridgeError, Result};

pub use client::{query, ApiResponse, Client, Credentials, PaginationCursor, Query, Resource, Verb};
pub use crypto::MasterKey;
pub use store::{
    ConfigStore, InMemoryConfigStore, InMemoryOrderStore, Order, OrderStatus, OrderStore,
};
pub use transport::{ApiRequest, HttpMethod, RawResponse, Transport};
pub use vault::{CredentialVault, EncryptedSecret, SecretScope};
pub use webhook::{Environment, InboundRequest, WebhookAuthenticator, WebhookSecrets};

pub use banks::{fetch_banks, Bank};
pub use gateway::{Gateway, NotificationOutcome, PaymentContext, PaymentRedirect, PaymentStatus};
pub use settings::{GatewaySettings, LoadedSettings, SiteContext};

#[cfg(feature = "full")]
pub use store::SqliteStore;
#[cfg(feature = "full")]
pub use transport::ReqwestTransport;
