//! Read-only network queries.
//!
//! [`NetworkQuery`] is the seam between the payment engine and the ledger
//! network: the builder uses it to resolve mint metadata, check holding
//! accounts, and fetch a recent blockhash; the poller uses it to search for
//! the correlation key and validate the settling transfer. Everything is
//! read-only; nothing here signs or broadcasts.
//!
//! [`SolanaNetwork`] implements the trait over the nonblocking
//! `solana-client` RPC client. Tests substitute their own mock.

use async_trait::async_trait;
use solana_account::Account;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_client::GetConfirmedSignaturesForAddress2Config;
use solana_client::rpc_config::RpcTransactionConfig;
use solana_commitment_config::CommitmentConfig;
use solana_message::Hash;
use solana_pubkey::Pubkey;
use solana_signature::Signature;
use solana_transaction_status_client_types::{
    UiTransactionEncoding, UiTransactionStatusMeta, UiTransactionTokenBalance,
};
use std::str::FromStr;

use paytill::intent::AssetKind;

/// A read-only network lookup failed.
///
/// Callers treat these as transient: the poller retries on its next tick
/// and the builder maps them to a retryable build failure.
#[derive(Debug, thiserror::Error)]
#[error("network query failed: {0}")]
pub struct QueryError(pub String);

/// A transaction observed to reference a correlation key.
#[derive(Debug, Clone)]
pub struct ReferenceSighting {
    /// Signature of the referencing transaction.
    pub signature: String,
    /// Block time reported by the network, seconds since the Unix epoch.
    pub block_time: Option<i64>,
}

/// What a settling transfer must satisfy to confirm an intent.
#[derive(Debug, Clone)]
pub struct TransferExpectation {
    /// The merchant's receiving account (the owner, not a holding account).
    pub destination: Pubkey,
    /// The expected settlement asset.
    pub asset: AssetKind,
    /// Minimum amount in the asset's base units.
    pub min_base_amount: u64,
}

/// Read-only queries against the ledger network.
#[async_trait]
pub trait NetworkQuery: Send + Sync {
    /// Fetches an account, or `None` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] when the lookup itself fails.
    async fn get_account(&self, address: &Pubkey) -> Result<Option<Account>, QueryError>;

    /// Fetches a recent blockhash bounding the transaction's validity.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] when the network is unreachable.
    async fn latest_blockhash(&self) -> Result<Hash, QueryError>;

    /// Looks for a finalized transaction referencing `reference`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] when the lookup fails.
    async fn find_reference(
        &self,
        reference: &Pubkey,
    ) -> Result<Option<ReferenceSighting>, QueryError>;

    /// Checks that the transaction behind `signature` paid at least the
    /// expected amount to the expected destination in the expected asset.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] when the transaction cannot be fetched.
    async fn validate_transfer(
        &self,
        signature: &str,
        expectation: &TransferExpectation,
    ) -> Result<bool, QueryError>;
}

/// [`NetworkQuery`] over a Solana JSON-RPC endpoint.
pub struct SolanaNetwork {
    client: RpcClient,
}

impl std::fmt::Debug for SolanaNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaNetwork").finish_non_exhaustive()
    }
}

impl SolanaNetwork {
    /// Connects to an RPC endpoint at `confirmed` commitment.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: RpcClient::new_with_commitment(url.into(), CommitmentConfig::confirmed()),
        }
    }
}

#[async_trait]
impl NetworkQuery for SolanaNetwork {
    async fn get_account(&self, address: &Pubkey) -> Result<Option<Account>, QueryError> {
        let response = self
            .client
            .get_account_with_commitment(address, CommitmentConfig::confirmed())
            .await
            .map_err(|e| QueryError(e.to_string()))?;
        Ok(response.value)
    }

    async fn latest_blockhash(&self) -> Result<Hash, QueryError> {
        self.client
            .get_latest_blockhash()
            .await
            .map_err(|e| QueryError(e.to_string()))
    }

    async fn find_reference(
        &self,
        reference: &Pubkey,
    ) -> Result<Option<ReferenceSighting>, QueryError> {
        let config = GetConfirmedSignaturesForAddress2Config {
            before: None,
            until: None,
            limit: Some(10),
            commitment: Some(CommitmentConfig::confirmed()),
        };
        let sightings = self
            .client
            .get_signatures_for_address_with_config(reference, config)
            .await
            .map_err(|e| QueryError(e.to_string()))?;
        Ok(sightings
            .into_iter()
            .find(|status| status.err.is_none())
            .map(|status| ReferenceSighting {
                signature: status.signature,
                block_time: status.block_time,
            }))
    }

    async fn validate_transfer(
        &self,
        signature: &str,
        expectation: &TransferExpectation,
    ) -> Result<bool, QueryError> {
        let signature =
            Signature::from_str(signature).map_err(|e| QueryError(e.to_string()))?;
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Base64),
            commitment: Some(CommitmentConfig::confirmed()),
            max_supported_transaction_version: Some(0),
        };
        let fetched = self
            .client
            .get_transaction_with_config(&signature, config)
            .await
            .map_err(|e| QueryError(e.to_string()))?;

        let Some(meta) = fetched.transaction.meta else {
            return Ok(false);
        };
        if meta.err.is_some() {
            return Ok(false);
        }

        match &expectation.asset {
            AssetKind::Sol => {
                let Some(decoded) = fetched.transaction.transaction.decode() else {
                    return Ok(false);
                };
                let keys = decoded.message.static_account_keys();
                let Some(index) = keys.iter().position(|k| k == &expectation.destination) else {
                    return Ok(false);
                };
                let pre = meta.pre_balances.get(index).copied().unwrap_or(0);
                let post = meta.post_balances.get(index).copied().unwrap_or(0);
                Ok(post.saturating_sub(pre) >= expectation.min_base_amount)
            }
            AssetKind::Token { mint } => {
                let received = token_delta(&meta, &expectation.destination, mint);
                Ok(received >= expectation.min_base_amount)
            }
        }
    }
}

/// Base-unit amount `owner` gained for `mint` in a transaction.
fn token_delta(meta: &UiTransactionStatusMeta, owner: &Pubkey, mint: &Pubkey) -> u64 {
    let owner = owner.to_string();
    let mint = mint.to_string();
    let pre: Vec<UiTransactionTokenBalance> =
        Option::from(meta.pre_token_balances.clone()).unwrap_or_default();
    let post: Vec<UiTransactionTokenBalance> =
        Option::from(meta.post_token_balances.clone()).unwrap_or_default();
    let owned_total = |balances: &[UiTransactionTokenBalance]| -> u64 {
        balances
            .iter()
            .filter(|balance| {
                balance.mint == mint
                    && Option::<String>::from(balance.owner.clone()).as_deref() == Some(&owner)
            })
            .filter_map(|balance| balance.ui_token_amount.amount.parse::<u64>().ok())
            .sum()
    };
    owned_total(&post).saturating_sub(owned_total(&pre))
}
