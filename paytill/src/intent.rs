//! Payment intents, records, and the status state machine.
//!
//! A [`PaymentIntent`] is the logical record of an expected payment, created
//! at transaction-build time before the payer has signed anything. The
//! [`ledger`](crate::ledger) turns it into a [`PaymentRecord`] and owns all
//! further mutation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use solana_pubkey::Pubkey;

use crate::correlation::CorrelationKey;

/// Decimal precision of the network's native asset (lamports per SOL).
pub const NATIVE_DECIMALS: u32 = 9;

/// Product reference recorded for payments that match no prior intent.
///
/// Direct transfers to a watched merchant account are still recorded rather
/// than silently dropped; this sentinel marks them.
pub const UNKNOWN_PRODUCT: &str = "unknown";

/// Serde adapter rendering a [`Pubkey`] as its base58 string form.
pub mod serde_pubkey {
    use serde::{Deserialize, Deserializer, Serializer};
    use solana_pubkey::Pubkey;
    use std::str::FromStr;

    /// Serializes a pubkey as base58.
    ///
    /// # Errors
    ///
    /// Never fails for a valid serializer.
    pub fn serialize<S: Serializer>(pubkey: &Pubkey, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(pubkey)
    }

    /// Deserializes a pubkey from a base58 string.
    ///
    /// # Errors
    ///
    /// Fails when the string is not a valid base58 address.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Pubkey, D::Error> {
        let s = String::deserialize(deserializer)?;
        Pubkey::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Opaque identifier of a payment intent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntentId(String);

impl IntentId {
    /// Creates an identifier from a raw string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derives an identifier from the intent's correlation key.
    ///
    /// Correlation keys are single-use and globally unique, so the derived
    /// identifier inherits both properties.
    #[must_use]
    pub fn from_correlation(key: &CorrelationKey) -> Self {
        Self(format!("pi_{key}"))
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IntentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The asset class a payment settles in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum AssetKind {
    /// The network's native asset, transferred account to account.
    Sol,
    /// A ledger-hosted token requiring a holding account per owner.
    Token {
        /// The token's mint address.
        #[serde(with = "serde_pubkey")]
        mint: Pubkey,
    },
}

impl AssetKind {
    /// Returns the mint address for tokenized assets.
    #[must_use]
    pub const fn mint(&self) -> Option<&Pubkey> {
        match self {
            Self::Sol => None,
            Self::Token { mint } => Some(mint),
        }
    }
}

/// Lifecycle state of a payment record.
///
/// `Pending → Confirmed` happens exactly once, applied by whichever
/// confirmation path observes settlement first. `Pending → Failed` happens
/// only on an explicit build/broadcast error, never after `Confirmed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Created at build time; settlement not yet observed.
    Pending,
    /// Settlement observed on-chain.
    Confirmed,
    /// Build or broadcast failed before settlement.
    Failed,
}

/// Creation input for a payment record.
#[derive(Debug, Clone)]
pub struct PaymentIntent {
    /// Unique intent identifier.
    pub id: IntentId,
    /// Slug of the storefront the product belongs to.
    pub storefront: String,
    /// Product reference within the storefront.
    pub product: String,
    /// Listed price in the asset's display unit.
    pub amount: Decimal,
    /// Settlement asset.
    pub asset: AssetKind,
    /// Single-use key embedded in the built transaction.
    pub correlation: CorrelationKey,
    /// The merchant's receiving account, watched for inbound events.
    pub merchant: Pubkey,
    /// The paying wallet.
    pub payer: Pubkey,
}

/// A ledger-owned payment record.
///
/// Only [`PaymentLedger`](crate::ledger::PaymentLedger) mutates these; both
/// confirmation paths merely propose transitions.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    /// Unique intent identifier.
    pub id: IntentId,
    /// Slug of the storefront the product belongs to.
    pub storefront: String,
    /// Product reference, or [`UNKNOWN_PRODUCT`] for direct payments.
    pub product: String,
    /// Listed price in the asset's display unit.
    pub amount: Decimal,
    /// Settlement asset.
    pub asset: AssetKind,
    /// Correlation key embedded in the built transaction.
    pub correlation: CorrelationKey,
    /// The merchant's receiving account.
    #[serde(with = "serde_pubkey")]
    pub merchant: Pubkey,
    /// The paying wallet.
    #[serde(with = "serde_pubkey")]
    pub payer: Pubkey,
    /// Lifecycle state.
    pub status: PaymentStatus,
    /// Signature of the settling transaction, once confirmed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Reason recorded by a failed build/broadcast.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    /// Creation time, seconds since the Unix epoch.
    pub created_at: u64,
    /// Confirmation time, seconds since the Unix epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<u64>,
}

impl PaymentRecord {
    /// Builds the initial `Pending` record for an intent.
    #[must_use]
    pub fn pending(intent: PaymentIntent, created_at: u64) -> Self {
        Self {
            id: intent.id,
            storefront: intent.storefront,
            product: intent.product,
            amount: intent.amount,
            asset: intent.asset,
            correlation: intent.correlation,
            merchant: intent.merchant,
            payer: intent.payer,
            status: PaymentStatus::Pending,
            signature: None,
            failure: None,
            created_at,
            confirmed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_id_derivation_is_stable() {
        let key = CorrelationKey::generate();
        assert_eq!(IntentId::from_correlation(&key), IntentId::from_correlation(&key));
        assert!(IntentId::from_correlation(&key).as_str().starts_with("pi_"));
    }

    #[test]
    fn asset_kind_exposes_mint_only_for_tokens() {
        let mint = Pubkey::new_unique();
        assert_eq!(AssetKind::Token { mint }.mint(), Some(&mint));
        assert_eq!(AssetKind::Sol.mint(), None);
    }

    #[test]
    fn record_serializes_addresses_as_base58() {
        let key = CorrelationKey::generate();
        let merchant = Pubkey::new_unique();
        let intent = PaymentIntent {
            id: IntentId::from_correlation(&key),
            storefront: "demo".into(),
            product: "sku-1".into(),
            amount: Decimal::from(5),
            asset: AssetKind::Sol,
            correlation: key,
            merchant,
            payer: Pubkey::new_unique(),
        };
        let record = PaymentRecord::pending(intent, 1_700_000_000);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["merchant"], merchant.to_string());
        assert_eq!(value["status"], "pending");
        assert!(value.get("signature").is_none());
    }
}
