#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for the paytill merchant payment engine.
//!
//! This crate holds the chain-agnostic heart of the system: fee-split
//! arithmetic, the payment-intent ledger with its state machine, single-use
//! correlation keys, and merchant notifications. Chain-specific transaction
//! construction and network polling live in `paytill-svm`; the HTTP surface
//! lives in `paytill-gateway`.
//!
//! # Overview
//!
//! A checkout creates a [`intent::PaymentIntent`] and registers it with the
//! [`ledger::PaymentLedger`] in the `Pending` state before the payer ever
//! signs anything. Settlement is observed by two independent, racing paths
//! (a client-side poller and a pushed webhook); both propose the
//! `Pending → Confirmed` transition through the ledger, which applies it
//! exactly once per record. First writer wins, everyone else no-ops.
//!
//! # Modules
//!
//! - [`fees`] - Platform fee splitting with exact decimal arithmetic
//! - [`correlation`] - Single-use keys embedded in transactions for lookup
//! - [`intent`] - Payment intents, records, and the status state machine
//! - [`ledger`] - The authoritative in-process record store
//! - [`notify`] - Append-only per-merchant notifications
//! - [`time`] - Epoch-seconds timestamps

pub mod correlation;
pub mod fees;
pub mod intent;
pub mod ledger;
pub mod notify;
pub mod time;

pub use correlation::CorrelationKey;
pub use fees::{FeeBreakdown, FeeConfig};
pub use intent::{AssetKind, IntentId, PaymentIntent, PaymentRecord, PaymentStatus};
pub use ledger::{Confirmation, DuplicateIntentError, PaymentLedger};
pub use notify::{Notification, NotificationKind, NotificationLog};
