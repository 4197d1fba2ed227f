//! Single-use correlation keys.
//!
//! A correlation key is a throwaway account address embedded in the built
//! transaction as a non-signing, read-only reference. It carries no funds
//! and no program; its only purpose is to make the settling transaction
//! discoverable by an address lookup once it lands on-chain.
//!
//! Keys are generated from an ephemeral keypair whose secret half is
//! discarded immediately, so every key is globally unique and no one can
//! ever sign for it. Reusing a key across two builds is a caller error.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use solana_keypair::Keypair;
use solana_pubkey::Pubkey;
use solana_signer::Signer;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// A single-use key correlating an on-chain transaction with the payment
/// intent that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationKey(Pubkey);

impl CorrelationKey {
    /// Generates a fresh key from an ephemeral keypair.
    #[must_use]
    pub fn generate() -> Self {
        Self(Keypair::new().pubkey())
    }

    /// Wraps an existing address as a correlation key.
    #[must_use]
    pub const fn new(pubkey: Pubkey) -> Self {
        Self(pubkey)
    }

    /// The underlying account address.
    #[must_use]
    pub const fn pubkey(&self) -> &Pubkey {
        &self.0
    }
}

impl Display for CorrelationKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CorrelationKey {
    type Err = <Pubkey as FromStr>::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Pubkey::from_str(s)?))
    }
}

impl Serialize for CorrelationKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for CorrelationKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}
