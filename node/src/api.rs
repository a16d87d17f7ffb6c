//! # HTTP API
//!
//! Builds the axum router that exposes the distributor client surface over
//! the devnet accounts. All endpoints share application state through
//! axum's `State` extractor.
//!
//! ## Endpoints
//!
//! | Method | Path                  | Description                                   |
//! |--------|-----------------------|-----------------------------------------------|
//! | GET    | `/health`             | Liveness probe                                |
//! | GET    | `/status`             | Chain and deployment summary                  |
//! | GET    | `/accounts`           | Devnet account addresses                      |
//! | GET    | `/balances/:address`  | Current balance handle of an address          |
//! | POST   | `/faucet`             | Mint to a devnet account                      |
//! | POST   | `/distribute`         | Batch distribution sent by a devnet account   |
//! | POST   | `/decrypt`            | User decryption of a balance                  |
//!
//! Actions answer with the client's `ActionStatus` plus its `status` string
//! (`confirmed`, or an error kind such as `insufficient-balance`).

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use shroud_protocol::address::Address;
use shroud_protocol::auth::{LocalSigner, Signer};
use shroud_protocol::client::{ActionStatus, BalanceDisplay, DistributionRow};
use shroud_protocol::codec::CiphertextHandle;
use shroud_protocol::error::ErrorKind;
use shroud_protocol::settlement::SettlementClient;

use crate::devnet::Devnet;
use crate::metrics::SharedMetrics;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared application state. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub version: String,
    pub devnet: Arc<Devnet>,
    pub metrics: SharedMetrics,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the full axum [`Router`] with all API routes, CORS, and tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/accounts", get(accounts_handler))
        .route("/balances/:address", get(balance_handler))
        .route("/faucet", post(faucet_handler))
        .route("/distribute", post(distribute_handler))
        .route("/decrypt", post(decrypt_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response Types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub network: String,
    pub chain_id: u64,
    pub block_number: u64,
    pub pending_transactions: usize,
    pub holders: usize,
    pub token: Address,
    pub distributor: Address,
    pub overflow_policy: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccountEntry {
    pub index: usize,
    pub address: Address,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub address: Address,
    /// Opaque ciphertext handle; all zeroes if the account never held funds.
    pub handle: CiphertextHandle,
}

#[derive(Debug, Deserialize)]
pub struct FaucetRequest {
    /// Devnet account that sends the mint and receives the funds.
    pub account: Address,
    pub amount: String,
}

#[derive(Debug, Deserialize)]
pub struct DistributeRequest {
    /// Devnet account that sends the transaction.
    pub account: Address,
    pub rows: Vec<DistributionRow>,
}

#[derive(Debug, Deserialize)]
pub struct DecryptRequest {
    /// Devnet account whose key signs the grant.
    pub account: Address,
    /// Balance to decrypt; defaults to `account`'s own.
    #[serde(default)]
    pub owner: Option<Address>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DecryptResponse {
    pub owner: Address,
    pub balance: BalanceDisplay,
    /// The balance as shown to a user: an amount, or `Error`.
    pub display: String,
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub status: String,
    #[serde(flatten)]
    pub action: ActionStatus,
}

/// A JSON error body with an HTTP status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    fn unavailable(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

fn action_response(action: ActionStatus) -> Response {
    let code = match &action {
        ActionStatus::Confirmed { .. } => StatusCode::OK,
        ActionStatus::Pending { .. } => StatusCode::ACCEPTED,
        ActionStatus::Failed { kind, .. } if kind.is_validation() => StatusCode::BAD_REQUEST,
        ActionStatus::Failed {
            kind: ErrorKind::NetworkFailure,
            ..
        } => StatusCode::SERVICE_UNAVAILABLE,
        ActionStatus::Failed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
    };
    let body = ActionResponse {
        status: action.status(),
        action,
    };
    (code, Json(body)).into_response()
}

impl AppState {
    fn signer(&self, account: &Address) -> Result<Arc<LocalSigner>, ApiError> {
        self.devnet
            .account_by_address(account)
            .ok_or_else(|| ApiError::not_found(format!("{} is not a devnet account", account)))
    }

    fn refresh_chain_metrics(&self) {
        self.metrics.observe_chain(&self.devnet.chain.status());
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// `GET /health`: returns 200 if the node is alive.
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

/// `GET /status`
async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let chain = state.devnet.chain.status();
    let config = &state.devnet.config;
    Json(StatusResponse {
        version: state.version.clone(),
        network: config.network.name.clone(),
        chain_id: config.network.chain_id,
        block_number: chain.block_number,
        pending_transactions: chain.pending,
        holders: chain.holders,
        token: state.devnet.deployment.token,
        distributor: state.devnet.deployment.distributor,
        overflow_policy: config.overflow_policy.to_string(),
    })
}

/// `GET /accounts`
async fn accounts_handler(State(state): State<AppState>) -> impl IntoResponse {
    let accounts: Vec<AccountEntry> = state
        .devnet
        .accounts
        .iter()
        .enumerate()
        .map(|(index, signer)| AccountEntry {
            index,
            address: signer.address(),
        })
        .collect();
    Json(accounts)
}

/// `GET /balances/:address`: the handle only. Reading the amount needs a
/// signed grant through `/decrypt`.
async fn balance_handler(
    Path(address): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<BalanceResponse>, Response> {
    let address: Address = address.parse().map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": format!("invalid address: {}", e) })),
        )
            .into_response()
    })?;
    let handle = state
        .devnet
        .chain
        .confidential_balance_of(address)
        .await
        .map_err(|e| ApiError::unavailable(e.to_string()).into_response())?;
    Ok(Json(BalanceResponse { address, handle }))
}

/// `POST /faucet`
async fn faucet_handler(
    State(state): State<AppState>,
    Json(req): Json<FaucetRequest>,
) -> Result<Response, ApiError> {
    let signer = state.signer(&req.account)?;
    let action = state.devnet.client(signer).request_faucet(&req.amount).await;
    if action.is_confirmed() {
        state.metrics.faucet_mints_total.inc();
    }
    state.refresh_chain_metrics();
    Ok(action_response(action))
}

/// `POST /distribute`
async fn distribute_handler(
    State(state): State<AppState>,
    Json(req): Json<DistributeRequest>,
) -> Result<Response, ApiError> {
    let signer = state.signer(&req.account)?;
    let count = req.rows.len();
    state.metrics.batch_size.observe(count as f64);

    let action = state.devnet.client(signer).distribute(&req.rows).await;
    if action.is_confirmed() {
        state.metrics.distributions_total.inc();
        state.metrics.distribution_recipients_total.inc_by(count as u64);
    }
    state.refresh_chain_metrics();
    Ok(action_response(action))
}

/// `POST /decrypt`: runs a full user decryption with the account's key.
/// Asking for someone else's balance shows `Error`.
async fn decrypt_handler(
    State(state): State<AppState>,
    Json(req): Json<DecryptRequest>,
) -> Result<Json<DecryptResponse>, ApiError> {
    let signer = state.signer(&req.account)?;
    let owner = req.owner.unwrap_or(req.account);
    let balance = state.devnet.client(signer).decrypt_balance_of(owner).await;
    if balance.is_error() {
        state.metrics.decryption_failures_total.inc();
    } else {
        state.metrics.decryptions_total.inc();
    }
    Ok(Json(DecryptResponse {
        owner,
        display: balance.to_string(),
        balance,
    }))
}
