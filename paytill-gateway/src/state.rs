//! Shared application state.

use std::collections::HashMap;
use std::sync::Arc;

use solana_pubkey::Pubkey;

use paytill::fees::FeeConfig;
use paytill::ledger::PaymentLedger;
use paytill::notify::NotificationLog;
use paytill_svm::rpc::NetworkQuery;

use crate::directory::StorefrontDirectory;

/// Everything the handlers need, shared across requests.
pub struct AppState {
    /// The authoritative payment-intent store.
    pub ledger: Arc<PaymentLedger>,
    /// Per-merchant notification logs.
    pub notifications: Arc<NotificationLog>,
    /// Storefront collaborator.
    pub directory: Arc<dyn StorefrontDirectory>,
    /// Read-only network access.
    pub network: Arc<dyn NetworkQuery>,
    /// Fee routing, resolved once at startup.
    pub fees: FeeConfig,
    /// Accepted tokenized assets, keyed by lowercase symbol.
    pub tokens: HashMap<String, Pubkey>,
    /// Webhook shared secret; `None` skips verification.
    pub webhook_secret: Option<String>,
}

impl AppState {
    /// Display symbol for an asset, resolved through the token registry.
    #[must_use]
    pub fn asset_label(&self, asset: &paytill::intent::AssetKind) -> String {
        match asset {
            paytill::intent::AssetKind::Sol => "SOL".to_owned(),
            paytill::intent::AssetKind::Token { mint } => self
                .tokens
                .iter()
                .find(|(_, registered)| *registered == mint)
                .map_or_else(|| "tokens".to_owned(), |(symbol, _)| symbol.to_uppercase()),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("fees", &self.fees)
            .field("tokens", &self.tokens)
            .field("webhook_auth", &self.webhook_secret.is_some())
            .finish_non_exhaustive()
    }
}

/// Handler-facing alias.
pub type SharedState = Arc<AppState>;
