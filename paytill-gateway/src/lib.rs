//! HTTP gateway for the paytill payment engine.
//!
//! Exposes the checkout surface (transaction-request endpoints and the fee
//! schedule) and the webhook ingestion pipeline over Axum, wired to the
//! in-process payment ledger.
//!
//! # Modules
//!
//! - [`handlers`] — Axum route handlers and the router builder
//! - [`webhook`] — authenticated inbound ledger-event processing
//! - [`directory`] — storefront collaborator trait and in-memory store
//! - [`state`] — shared application state
//! - [`config`] — TOML configuration with environment variable expansion
//! - [`error`] — HTTP error mapping

pub mod config;
pub mod directory;
pub mod error;
pub mod handlers;
pub mod state;
pub mod webhook;

pub use handlers::router;
pub use state::{AppState, SharedState};
