//! Build-time error taxonomy.
//!
//! The builder itself never retries; it classifies failures so the HTTP
//! boundary can decide between a 4xx (caller mistake) and a 5xx (the caller
//! may retry the whole build).

use rust_decimal::Decimal;
use solana_pubkey::Pubkey;

/// Errors raised while constructing a transfer transaction.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The asset's on-chain metadata could not be resolved.
    #[error("can not resolve asset {mint}: {reason}")]
    AssetResolution {
        /// The mint address that failed to resolve.
        mint: Pubkey,
        /// What went wrong.
        reason: String,
    },
    /// The ledger network could not be reached for a required lookup.
    #[error("ledger network unavailable: {0}")]
    NetworkUnavailable(String),
    /// The amount does not convert to a positive base-unit quantity.
    #[error("amount does not resolve to a positive transfer: {0}")]
    InvalidAmount(Decimal),
    /// Instruction assembly or message compilation failed.
    #[error("can not compile transfer message: {0}")]
    Compile(String),
}
