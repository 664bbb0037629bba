use std::sync::Arc;
use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::response::ApiResponse;
use crate::domain::entities::{Transaction, TransactionKind, TransactionStatus, Wallet};
use crate::domain::error::LedgerError;
use crate::domain::types::{IdempotencyKey, WalletUuid};
use crate::infrastructure::persistence::store::PgStore;
use crate::use_cases::deposit::DepositService;
use crate::use_cases::withdrawal::WithdrawalService;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<PgStore>,
    pub deposit_service: Arc<DepositService>,
    pub withdrawal_service: Arc<WithdrawalService>,
    pub withdrawal_max_retries: u32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct WalletDto {
    pub uuid: Uuid,
    pub balance: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Wallet> for WalletDto {
    fn from(w: Wallet) -> Self {
        Self {
            uuid: w.uuid.0,
            balance: w.balance,
            created_at: w.created_at,
            updated_at: w.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TransactionDto {
    pub id: i64,
    pub wallet_uuid: Uuid,
    pub amount: i64,
    pub kind: TransactionKind,
    pub status: TransactionStatus,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub executed_at: Option<DateTime<Utc>>,
    #[schema(value_type = Object)]
    pub third_party_response: Option<serde_json::Value>,
    pub retry_count: u32,
    pub is_terminal: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionDto {
    fn from_domain(tx: Transaction, wallet_uuid: Uuid, max_retries: u32) -> Self {
        let is_terminal = tx.is_terminal(max_retries);
        Self {
            id: tx.id.0,
            wallet_uuid,
            amount: tx.amount,
            kind: tx.kind,
            status: tx.status,
            scheduled_for: tx.scheduled_for,
            executed_at: tx.executed_at,
            third_party_response: tx.third_party_response,
            retry_count: tx.retry_count,
            is_terminal,
            created_at: tx.created_at,
            updated_at: tx.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DepositResponseDto {
    pub wallet: WalletDto,
    pub transaction: TransactionDto,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DepositRequestDto {
    pub amount: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct WithdrawRequestDto {
    pub amount: i64,
    pub scheduled_for: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct TransactionFilterParams {
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Query filters are matched case-insensitively against the enum, unlike
/// the wire representation used everywhere else in the payload bodies.
fn parse_status_filter(raw: Option<String>) -> Result<Option<TransactionStatus>, ApiError> {
    let Some(raw) = raw else { return Ok(None) };
    match raw.to_uppercase().as_str() {
        "PENDING" => Ok(Some(TransactionStatus::Pending)),
        "PROCESSING" => Ok(Some(TransactionStatus::Processing)),
        "COMPLETED" => Ok(Some(TransactionStatus::Completed)),
        "FAILED" => Ok(Some(TransactionStatus::Failed)),
        other => Err(LedgerError::InvalidArgument(format!("unknown status filter: {other}")).into()),
    }
}

fn parse_kind_filter(raw: Option<String>) -> Result<Option<TransactionKind>, ApiError> {
    let Some(raw) = raw else { return Ok(None) };
    match raw.to_uppercase().as_str() {
        "DEPOSIT" => Ok(Some(TransactionKind::Deposit)),
        "WITHDRAWAL" => Ok(Some(TransactionKind::Withdrawal)),
        other => Err(LedgerError::InvalidArgument(format!("unknown type filter: {other}")).into()),
    }
}

fn idempotency_key_from_headers(headers: &HeaderMap) -> Result<Option<IdempotencyKey>, ApiError> {
    match headers.get("Idempotency-Key") {
        None => Ok(None),
        Some(value) => {
            let s = value.to_str().map_err(|_| {
                LedgerError::InvalidArgument("Idempotency-Key header is not valid UTF-8".into())
            })?;
            IdempotencyKey::from_str(s)
                .map(Some)
                .map_err(|_| LedgerError::InvalidArgument("Idempotency-Key must be a uuid".into()).into())
        }
    }
}

#[utoipa::path(post, path = "/wallets", responses((status = 201, body = WalletDto)))]
async fn create_wallet(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<ApiResponse<WalletDto>>), ApiError> {
    let row = state.store.create_wallet().await.map_err(LedgerError::from)?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(WalletDto::from(Wallet::from(row)))),
    ))
}

#[utoipa::path(get, path = "/wallets/{uuid}", responses((status = 200, body = WalletDto)))]
async fn get_wallet(
    State(state): State<AppState>,
    Path(uuid): Path<Uuid>,
) -> Result<Json<ApiResponse<WalletDto>>, ApiError> {
    let row = state
        .store
        .find_wallet_by_uuid(uuid)
        .await
        .map_err(LedgerError::from)?
        .ok_or(LedgerError::NotFound)?;
    Ok(Json(ApiResponse::success(WalletDto::from(Wallet::from(row)))))
}

#[utoipa::path(
    post,
    path = "/wallets/{uuid}/deposit",
    request_body = DepositRequestDto,
    responses((status = 200, body = DepositResponseDto))
)]
async fn deposit(
    State(state): State<AppState>,
    Path(uuid): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<DepositRequestDto>,
) -> Result<Json<ApiResponse<DepositResponseDto>>, ApiError> {
    let key = idempotency_key_from_headers(&headers)?;
    let tx = state
        .deposit_service
        .deposit(WalletUuid(uuid), body.amount, key)
        .await?;

    let wallet_row = state
        .store
        .find_wallet_by_uuid(uuid)
        .await
        .map_err(LedgerError::from)?
        .ok_or(LedgerError::NotFound)?;

    Ok(Json(ApiResponse::success(DepositResponseDto {
        wallet: WalletDto::from(Wallet::from(wallet_row)),
        transaction: TransactionDto::from_domain(tx, uuid, state.withdrawal_max_retries),
    })))
}

#[utoipa::path(
    post,
    path = "/wallets/{uuid}/withdraw",
    request_body = WithdrawRequestDto,
    responses((status = 201, body = TransactionDto))
)]
async fn schedule_withdrawal(
    State(state): State<AppState>,
    Path(uuid): Path<Uuid>,
    headers: HeaderMap,
    Json(body): Json<WithdrawRequestDto>,
) -> Result<(StatusCode, Json<ApiResponse<TransactionDto>>), ApiError> {
    let key = idempotency_key_from_headers(&headers)?;
    let tx = state
        .withdrawal_service
        .schedule(WalletUuid(uuid), body.amount, body.scheduled_for, key)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(TransactionDto::from_domain(
            tx,
            uuid,
            state.withdrawal_max_retries,
        ))),
    ))
}

#[utoipa::path(
    get,
    path = "/wallets/{uuid}/transactions",
    responses((status = 200, body = [TransactionDto]))
)]
async fn list_transactions(
    State(state): State<AppState>,
    Path(uuid): Path<Uuid>,
    Query(params): Query<TransactionFilterParams>,
) -> Result<Json<ApiResponse<Vec<TransactionDto>>>, ApiError> {
    let wallet = state
        .store
        .find_wallet_by_uuid(uuid)
        .await
        .map_err(LedgerError::from)?
        .ok_or(LedgerError::NotFound)?;

    let status = parse_status_filter(params.status)?;
    let kind = parse_kind_filter(params.kind)?;

    let rows = state
        .store
        .list_transactions_for_wallet(wallet.id, status, kind)
        .await
        .map_err(LedgerError::from)?;

    let transactions = rows
        .into_iter()
        .map(|row| {
            TransactionDto::from_domain(Transaction::from(row), uuid, state.withdrawal_max_retries)
        })
        .collect();

    Ok(Json(ApiResponse::success(transactions)))
}

#[utoipa::path(
    get,
    path = "/wallets/{uuid}/transactions/{id}",
    responses((status = 200, body = TransactionDto))
)]
async fn get_transaction(
    State(state): State<AppState>,
    Path((uuid, id)): Path<(Uuid, i64)>,
) -> Result<Json<ApiResponse<TransactionDto>>, ApiError> {
    let wallet = state
        .store
        .find_wallet_by_uuid(uuid)
        .await
        .map_err(LedgerError::from)?
        .ok_or(LedgerError::NotFound)?;

    let row = state
        .store
        .find_transaction_by_id(wallet.id, id)
        .await
        .map_err(LedgerError::from)?
        .ok_or(LedgerError::NotFound)?;

    Ok(Json(ApiResponse::success(TransactionDto::from_domain(
        Transaction::from(row),
        uuid,
        state.withdrawal_max_retries,
    ))))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        create_wallet,
        get_wallet,
        deposit,
        schedule_withdrawal,
        list_transactions,
        get_transaction
    ),
    components(schemas(
        WalletDto,
        TransactionDto,
        DepositRequestDto,
        DepositResponseDto,
        WithdrawRequestDto
    ))
)]
pub struct ApiDoc;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/wallets", post(create_wallet))
        .route("/wallets/{uuid}", get(get_wallet))
        .route("/wallets/{uuid}/deposit", post(deposit))
        .route("/wallets/{uuid}/withdraw", post(schedule_withdrawal))
        .route("/wallets/{uuid}/transactions", get(list_transactions))
        .route("/wallets/{uuid}/transactions/{id}", get(get_transaction))
        .with_state(state)
}
