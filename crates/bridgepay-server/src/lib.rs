//! Bridge payment server: checkout endpoints, the webhook front controller
//! and merchant admin routes over the core [`bridgepay`] crate.
//!
//! # Modules
//!
//! - [`routes`] — HTTP endpoints (webhook, banks, checkout, admin, health, metrics)
//! - [`state`] — Shared [`AppState`](state::AppState): stores, vault, gateway
//! - [`config`] — Environment-driven [`ServerConfig`](config::ServerConfig)
//! - [`metrics`] — Prometheus counters for webhook and provider traffic

pub mod config;
pub mod metrics;
pub mod routes;
pub mod state;
