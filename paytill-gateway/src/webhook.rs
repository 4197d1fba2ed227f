//! Inbound ledger-event ingestion.
//!
//! An external indexing service pushes batches of network events for the
//! merchant accounts we watch. Each batch is authenticated with an
//! HMAC-SHA256 over the raw body, then every event is narrowed to at most
//! one recognized payment and proposed to the ledger. Processing is
//! idempotent on the transaction signature: the indexer delivers
//! at-least-once and retries whole batches.
//!
//! Attribution runs in confidence order: an exact correlation-key match
//! from the event's account list, then an amount+asset match among the
//! merchant's pending intents, then the newest pending intent. A payment
//! matching no intent at all is still recorded (with the `unknown` product
//! sentinel) so direct transfers are never dropped.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use solana_pubkey::Pubkey;

use paytill::correlation::CorrelationKey;
use paytill::intent::{AssetKind, IntentId, NATIVE_DECIMALS, PaymentIntent, UNKNOWN_PRODUCT};
use paytill::ledger::Confirmation;
use paytill::notify::NotificationKind;
use paytill::time;

use crate::directory::Storefront;
use crate::error::ApiError;
use crate::state::SharedState;

/// Header carrying the batch signature.
pub const SIGNATURE_HEADER: &str = "x-indexer-signature";

/// A pushed network event, as delivered by the indexer.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundLedgerEvent {
    /// Signature of the on-chain transaction.
    pub signature: String,
    /// Block time, seconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: Option<i64>,
    /// Account addresses referenced by the transaction, when the indexer
    /// supplies them. Used for exact correlation-key attribution.
    #[serde(default)]
    pub account_keys: Vec<String>,
    /// Native-asset transfers in the transaction.
    #[serde(default)]
    pub native_transfers: Vec<NativeTransfer>,
    /// Tokenized-asset transfers in the transaction.
    #[serde(default)]
    pub token_transfers: Vec<TokenTransfer>,
}

/// A native-asset transfer within an event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeTransfer {
    /// Sending account.
    #[serde(default)]
    pub from_user_account: String,
    /// Receiving account.
    pub to_user_account: String,
    /// Amount in lamports.
    pub amount: u64,
}

/// A tokenized-asset transfer within an event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransfer {
    /// Sending owner account.
    #[serde(default)]
    pub from_user_account: String,
    /// Receiving owner account.
    pub to_user_account: String,
    /// Token mint address.
    pub mint: String,
    /// Amount in the token's display unit.
    pub token_amount: Decimal,
}

/// Response of `POST /webhooks/ledger`.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Whether the batch was accepted.
    pub success: bool,
    /// How many events resulted in an applied confirmation.
    pub processed: usize,
}

/// The one payment a single event is allowed to carry.
#[derive(Debug)]
struct RecognizedPayment {
    source: Option<Pubkey>,
    destination: Pubkey,
    amount: Decimal,
    asset: AssetKind,
    storefront: Storefront,
}

/// `POST /webhooks/ledger` — authenticates and processes an event batch.
///
/// # Errors
///
/// Returns 401 when a secret is configured and the signature is missing or
/// mismatched, and 400 for a body that is not a JSON array. Neither leaves
/// any partial side effects.
pub async fn ingest(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    if let Some(secret) = &state.webhook_secret {
        let provided = headers
            .get(SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;
        verify_signature(secret, &body, provided)?;
    }

    let elements: Vec<serde_json::Value> = serde_json::from_slice(&body)?;
    let mut processed = 0usize;
    let mut skipped = 0usize;
    for element in elements {
        let event: InboundLedgerEvent = match serde_json::from_value(element) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(error = %err, "Skipping malformed batch element");
                skipped += 1;
                continue;
            }
        };
        if process_event(&state, &event) {
            processed += 1;
        } else {
            skipped += 1;
        }
    }

    tracing::info!(processed, skipped, "Processed webhook batch");
    Ok(Json(WebhookResponse {
        success: true,
        processed,
    }))
}

/// Constant-time check of the hex HMAC-SHA256 over the raw body.
fn verify_signature(secret: &str, body: &[u8], provided: &str) -> Result<(), ApiError> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| ApiError::Unauthorized)?;
    mac.update(body);
    let provided = hex::decode(provided.trim().trim_start_matches("sha256="))
        .map_err(|_| ApiError::Unauthorized)?;
    mac.verify_slice(&provided).map_err(|_| ApiError::Unauthorized)
}

/// Handles one event; returns `true` when a confirmation applied.
fn process_event(state: &SharedState, event: &InboundLedgerEvent) -> bool {
    if state.ledger.is_signature_recorded(&event.signature) {
        tracing::debug!(signature = %event.signature, "Event already recorded");
        return false;
    }
    let Some(payment) = recognize(state, event) else {
        return false;
    };
    #[allow(clippy::cast_sign_loss)]
    let observed_at = event
        .timestamp
        .filter(|t| *t >= 0)
        .map_or_else(time::epoch_secs, |t| t as u64);

    let confirmation = match correlate(state, event, &payment) {
        Some(id) => state
            .ledger
            .try_confirm_intent(&id, &event.signature, observed_at),
        None => materialize(state, &payment, &event.signature, observed_at),
    };

    match confirmation {
        Some(Confirmation { applied: true, record }) => {
            state.notifications.append(
                &record.storefront,
                NotificationKind::Payment,
                "Payment received",
                format!(
                    "{} {} for {}",
                    record.amount,
                    state.asset_label(&record.asset),
                    record.product
                ),
                Some(event.signature.clone()),
            );
            true
        }
        _ => false,
    }
}

/// Narrows an event to its first watched-destination transfer.
fn recognize(state: &SharedState, event: &InboundLedgerEvent) -> Option<RecognizedPayment> {
    for transfer in &event.native_transfers {
        let Ok(destination) = transfer.to_user_account.parse::<Pubkey>() else {
            continue;
        };
        let Some(storefront) = state.directory.by_wallet(&destination).into_iter().next() else {
            continue;
        };
        let Ok(lamports) = i64::try_from(transfer.amount) else {
            continue;
        };
        return Some(RecognizedPayment {
            source: transfer.from_user_account.parse().ok(),
            destination,
            amount: Decimal::new(lamports, NATIVE_DECIMALS),
            asset: AssetKind::Sol,
            storefront,
        });
    }
    for transfer in &event.token_transfers {
        let Ok(destination) = transfer.to_user_account.parse::<Pubkey>() else {
            continue;
        };
        let Ok(mint) = transfer.mint.parse::<Pubkey>() else {
            continue;
        };
        let Some(storefront) = state.directory.by_wallet(&destination).into_iter().next() else {
            continue;
        };
        return Some(RecognizedPayment {
            source: transfer.from_user_account.parse().ok(),
            destination,
            amount: transfer.token_amount,
            asset: AssetKind::Token { mint },
            storefront,
        });
    }
    None
}

/// Picks the pending intent an observed payment belongs to.
fn correlate(
    state: &SharedState,
    event: &InboundLedgerEvent,
    payment: &RecognizedPayment,
) -> Option<IntentId> {
    let pending = state.ledger.pending_for_account(&payment.destination);
    if pending.is_empty() {
        return None;
    }

    // An embedded correlation key in the transaction's account list is
    // authoritative; it disambiguates merchants with several equal-amount
    // pending intents.
    for raw in &event.account_keys {
        if let Ok(key) = raw.parse::<CorrelationKey>() {
            if let Some(record) = pending.iter().find(|r| r.correlation == key) {
                return Some(record.id.clone());
            }
        }
    }

    if let Some(record) = pending
        .iter()
        .filter(|r| r.asset == payment.asset)
        .find(|r| r.amount == payment.amount)
    {
        return Some(record.id.clone());
    }

    pending
        .iter()
        .max_by_key(|r| r.created_at)
        .map(|r| r.id.clone())
}

/// Records a payment that matched no prior intent.
fn materialize(
    state: &SharedState,
    payment: &RecognizedPayment,
    signature: &str,
    observed_at: u64,
) -> Option<Confirmation> {
    let correlation = CorrelationKey::generate();
    let intent = PaymentIntent {
        id: IntentId::from_correlation(&correlation),
        storefront: payment.storefront.slug.clone(),
        product: UNKNOWN_PRODUCT.to_owned(),
        amount: payment.amount,
        asset: payment.asset,
        correlation,
        merchant: payment.destination,
        payer: payment.source.unwrap_or_default(),
    };
    let record = match state.ledger.create(intent) {
        Ok(record) => record,
        Err(err) => {
            tracing::warn!(error = %err, signature, "Could not materialize direct payment");
            return None;
        }
    };
    tracing::info!(
        storefront = %record.storefront,
        signature,
        "Recorded direct payment with no matching intent"
    );
    state
        .ledger
        .try_confirm_intent(&record.id, signature, observed_at)
}
