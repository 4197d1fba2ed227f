//! Axum route handlers for the gateway.
//!
//! The checkout surface follows the transaction-request shape wallets
//! expect: a side-effect-free GET returning display metadata, and a POST
//! that validates the request, registers a pending payment intent, and
//! returns the unsigned base64 transaction for the wallet to sign.

use axum::extract::{Path, Query, State};
use axum::{Json, Router, routing};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use solana_pubkey::Pubkey;
use std::str::FromStr;

use paytill::correlation::CorrelationKey;
use paytill::fees::FeeBreakdown;
use paytill::intent::{AssetKind, IntentId, NATIVE_DECIMALS, PaymentIntent};
use paytill_svm::builder::{TransferRequest, build_transfer, encode_base64};

use crate::error::ApiError;
use crate::state::SharedState;
use crate::webhook;

/// Icon shown by wallets for storefronts without one of their own.
const DEFAULT_ICON: &str = "https://paytill.dev/icon.png";

/// Query parameters of the fee schedule endpoint.
#[derive(Debug, Deserialize)]
pub struct FeeQuery {
    /// Optional display amount to split for illustration.
    pub amount: Option<Decimal>,
}

/// Response of `GET /fees`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeScheduleResponse {
    /// Platform rate in basis points.
    pub platform_fee_bps: u16,
    /// Platform rate as a percentage.
    pub platform_fee_percent: Decimal,
    /// Split of the queried amount, when one was supplied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<FeeBreakdown>,
}

/// Response of `GET /pay/{storefront}/{product}`.
#[derive(Debug, Serialize)]
pub struct DisplayResponse {
    /// Merchant display label.
    pub label: String,
    /// Merchant display icon URL.
    pub icon: String,
    /// Product line shown under the label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Query parameters of the checkout endpoint.
#[derive(Debug, Deserialize)]
pub struct CheckoutQuery {
    /// Settlement asset override: `sol` or a configured token symbol.
    pub asset: Option<String>,
}

/// Body of `POST /pay/{storefront}/{product}`.
#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    /// The paying wallet's account address.
    pub account: String,
}

/// Response of a successful checkout build.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    /// Base64-encoded unsigned transaction.
    pub transaction: String,
    /// Human-readable line shown by the wallet.
    pub message: String,
    /// Correlation key to poll for settlement (base58).
    pub reference: String,
}

/// `GET /health` — liveness probe.
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /fees` — current platform fee schedule. Read-only.
pub async fn get_fee_schedule(
    State(state): State<SharedState>,
    Query(query): Query<FeeQuery>,
) -> Json<FeeScheduleResponse> {
    let breakdown = query
        .amount
        .map(|amount| state.fees.split(amount, NATIVE_DECIMALS));
    Json(FeeScheduleResponse {
        platform_fee_bps: state.fees.fee_bps(),
        platform_fee_percent: state.fees.fee_percent(),
        breakdown,
    })
}

/// `GET /pay/{storefront}/{product}` — wallet display metadata, no side
/// effects.
///
/// # Errors
///
/// Returns 404 for an unknown storefront or product.
pub async fn get_payment_display(
    State(state): State<SharedState>,
    Path((storefront, product)): Path<(String, String)>,
) -> Result<Json<DisplayResponse>, ApiError> {
    let store = state.directory.get(&storefront).ok_or(ApiError::NotFound)?;
    let product = store.product(&product).ok_or(ApiError::NotFound)?;
    Ok(Json(DisplayResponse {
        label: store.label.clone(),
        icon: store.icon.clone().unwrap_or_else(|| DEFAULT_ICON.to_owned()),
        message: Some(product.name.clone()),
    }))
}

/// `POST /pay/{storefront}/{product}` — builds the unsigned transfer and
/// registers the pending payment intent.
///
/// Address and amount validation happen before any network call; build-time
/// blockers surface as 5xx and fail the freshly created intent.
///
/// # Errors
///
/// Returns 400 for a malformed account or non-positive amount, 404 for an
/// unknown storefront/product, and 5xx for build failures.
pub async fn post_checkout(
    State(state): State<SharedState>,
    Path((storefront, product)): Path<(String, String)>,
    Query(query): Query<CheckoutQuery>,
    Json(body): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let store = state.directory.get(&storefront).ok_or(ApiError::NotFound)?;
    let product = store
        .product(&product)
        .ok_or(ApiError::NotFound)?
        .clone();

    let payer = Pubkey::from_str(body.account.trim())
        .map_err(|_| ApiError::Validation(format!("invalid account address: {}", body.account)))?;
    if product.price <= Decimal::ZERO {
        return Err(ApiError::Validation(format!(
            "product {} has no positive price",
            product.id
        )));
    }
    let asset = resolve_asset(&state, query.asset.as_deref(), product.asset)?;

    let correlation = CorrelationKey::generate();
    let intent = PaymentIntent {
        id: IntentId::from_correlation(&correlation),
        storefront: store.slug.clone(),
        product: product.id.clone(),
        amount: product.price,
        asset,
        correlation,
        merchant: store.wallet,
        payer,
    };
    let record = state.ledger.create(intent)?;

    let request = TransferRequest {
        payer,
        merchant: store.wallet,
        amount: product.price,
        asset,
        correlation: &correlation,
        memo: Some(format!("{}/{}", store.slug, product.id)),
    };
    let built = match build_transfer(state.network.as_ref(), &state.fees, request).await {
        Ok(built) => built,
        Err(err) => {
            let _ = state.ledger.mark_failed(&record.id, &err.to_string());
            return Err(err.into());
        }
    };
    let transaction = encode_base64(&built.transaction)?;

    tracing::info!(
        storefront = %store.slug,
        product = %product.id,
        intent = %record.id,
        "Built checkout transaction"
    );
    Ok(Json(CheckoutResponse {
        transaction,
        message: format!(
            "Pay {} {} for {}",
            product.price,
            state.asset_label(&asset),
            product.name
        ),
        reference: correlation.to_string(),
    }))
}

/// Resolves the settlement asset, honoring a query override.
fn resolve_asset(
    state: &SharedState,
    requested: Option<&str>,
    listed: AssetKind,
) -> Result<AssetKind, ApiError> {
    match requested {
        None => Ok(listed),
        Some(symbol) if symbol.eq_ignore_ascii_case("sol") => Ok(AssetKind::Sol),
        Some(symbol) => state
            .tokens
            .get(&symbol.to_lowercase())
            .map(|mint| AssetKind::Token { mint: *mint })
            .ok_or_else(|| ApiError::Validation(format!("unknown settlement asset: {symbol}"))),
    }
}

/// Builds the gateway router.
///
/// Endpoints:
/// - `GET /health` — liveness probe
/// - `GET /fees` — platform fee schedule
/// - `GET /pay/{storefront}/{product}` — wallet display metadata
/// - `POST /pay/{storefront}/{product}` — build checkout transaction
/// - `POST /webhooks/ledger` — inbound ledger-event batches
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health", routing::get(health))
        .route("/fees", routing::get(get_fee_schedule))
        .route(
            "/pay/{storefront}/{product}",
            routing::get(get_payment_display).post(post_checkout),
        )
        .route("/webhooks/ledger", routing::post(webhook::ingest))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{demo_directory, state_with};
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use paytill::fees::FeeConfig;
    use paytill::intent::PaymentStatus;
    use tower::ServiceExt;

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn checkout_request(uri: &str, account: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(format!("{{\"account\":\"{account}\"}}")))
            .unwrap()
    }

    #[tokio::test]
    async fn fee_schedule_reports_the_breakdown() {
        let (directory, _) = demo_directory();
        let treasury = Pubkey::new_unique();
        let state = state_with(directory, FeeConfig::new(Some(treasury), 75), None);

        let response = router(state)
            .oneshot(Request::get("/fees?amount=100").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["platformFeeBps"], 75);
        assert_eq!(json["breakdown"]["fee"], "0.75");
        assert_eq!(json["breakdown"]["merchant"], "99.25");
    }

    #[tokio::test]
    async fn display_metadata_has_no_side_effects() {
        let (directory, _) = demo_directory();
        let state = state_with(directory, FeeConfig::disabled(), None);
        let ledger = std::sync::Arc::clone(&state.ledger);

        let response = router(state)
            .oneshot(Request::get("/pay/demo/sku-1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["label"], "Demo Store");
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn checkout_returns_a_transaction_and_registers_the_intent() {
        let (directory, _) = demo_directory();
        let state = state_with(directory, FeeConfig::disabled(), None);
        let ledger = std::sync::Arc::clone(&state.ledger);
        let payer = Pubkey::new_unique();

        let response = router(state)
            .oneshot(checkout_request("/pay/demo/sku-1", &payer.to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert!(!json["transaction"].as_str().unwrap().is_empty());

        let reference: Pubkey = json["reference"].as_str().unwrap().parse().unwrap();
        let record = ledger
            .find_by_correlation(&CorrelationKey::new(reference))
            .unwrap();
        assert_eq!(record.status, PaymentStatus::Pending);
        assert_eq!(record.payer, payer);
        assert_eq!(record.product, "sku-1");
    }

    #[tokio::test]
    async fn checkout_rejects_a_malformed_account() {
        let (directory, _) = demo_directory();
        let state = state_with(directory, FeeConfig::disabled(), None);
        let ledger = std::sync::Arc::clone(&state.ledger);

        let response = router(state)
            .oneshot(checkout_request("/pay/demo/sku-1", "not-an-address"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(ledger.is_empty());
    }

    #[tokio::test]
    async fn checkout_rejects_unknown_product_references() {
        let (directory, _) = demo_directory();
        let state = state_with(directory, FeeConfig::disabled(), None);
        let payer = Pubkey::new_unique();

        let response = router(state)
            .oneshot(checkout_request("/pay/demo/sku-404", &payer.to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn checkout_rejects_unknown_asset_overrides() {
        let (directory, _) = demo_directory();
        let state = state_with(directory, FeeConfig::disabled(), None);
        let payer = Pubkey::new_unique();

        let response = router(state)
            .oneshot(checkout_request(
                "/pay/demo/sku-1?asset=doge",
                &payer.to_string(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn checkout_rejects_non_positive_prices_before_creating_an_intent() {
        let (directory, _) = demo_directory();
        // sku-free is listed at zero in the demo directory.
        let state = state_with(directory, FeeConfig::disabled(), None);
        let ledger = std::sync::Arc::clone(&state.ledger);
        let payer = Pubkey::new_unique();

        let response = router(state)
            .oneshot(checkout_request("/pay/demo/sku-free", &payer.to_string()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(ledger.is_empty());
    }
}
