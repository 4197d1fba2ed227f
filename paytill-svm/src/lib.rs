#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Solana support for the paytill payment engine.
//!
//! This crate turns a priced checkout into an unsigned, fee-split Solana
//! transaction and watches the network for its settlement. It supports the
//! native asset (direct lamport transfers) and SPL Token / Token-2022 assets
//! (associated-token-account transfers with payer-funded account creation).
//!
//! # Architecture
//!
//! - [`builder`] - [`TransferPlan`](builder::TransferPlan) resolution and
//!   unsigned transaction construction with the embedded correlation key
//! - [`rpc`] - the read-only [`NetworkQuery`](rpc::NetworkQuery) abstraction
//!   and its `solana-client` implementation
//! - [`poller`] - the cancellable per-checkout confirmation poll loop
//! - [`error`] - build-time error taxonomy
//!
//! The builder performs no signing and never holds funds: it produces a
//! transaction for the payer's wallet to sign and broadcast, with every
//! transfer going directly account to account.

pub mod builder;
pub mod error;
pub mod poller;
pub mod rpc;

pub use builder::{BuiltTransfer, TransferPlan, TransferRequest, build_transfer, encode_base64};
pub use error::BuildError;
pub use poller::{ConfirmationPoller, PollOutcome};
pub use rpc::{NetworkQuery, QueryError, ReferenceSighting, SolanaNetwork, TransferExpectation};
