//! Transfer handlers
//!
//! Request checks run as plain reads before the engine opens its transaction:
//! 1. body validation, distinct accounts
//! 2. from-account exists and belongs to the caller
//! 3. both currencies match the request
//! 4. from-account balance covers the amount

use std::sync::Arc;

use axum::{
    Extension,
    extract::{Path, State},
    http::StatusCode,
};

use super::super::state::AppState;
use super::super::types::{
    ApiError, ApiResponse, ApiResult, TransferRequest, ValidatedJson, error_codes, ok,
};
use super::account::owned_account;
use super::current_user;
use crate::ledger::{
    Account, Currency, Queries, Transfer, TransferTxParams, TransferTxResult, transfer_tx,
};
use crate::token::Payload;

async fn account_in_currency(
    q: &mut dyn Queries,
    account_id: i64,
    currency: Currency,
) -> Result<Account, ApiError> {
    let account = q.get_account(account_id).await.map_err(|e| {
        if e.is_not_found() {
            ApiError::not_found(format!("Account {} not found", account_id))
        } else {
            e.into()
        }
    })?;
    ensure_currency(&account, currency)?;
    Ok(account)
}

fn ensure_currency(account: &Account, currency: Currency) -> Result<(), ApiError> {
    if account.currency != currency {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            error_codes::CURRENCY_MISMATCH,
            format!(
                "Account [{}] currency mismatch: {} vs {}",
                account.id, account.currency, currency
            ),
        ));
    }
    Ok(())
}

/// Transfer funds between two accounts
///
/// POST /api/v1/transfers
#[utoipa::path(
    post,
    path = "/api/v1/transfers",
    request_body = TransferRequest,
    responses(
        (status = 200, description = "Transfer committed", body = ApiResponse<TransferTxResult>),
        (status = 400, description = "Invalid parameters, currency mismatch or insufficient balance"),
        (status = 401, description = "Caller does not own the source account"),
        (status = 404, description = "Account not found"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Transfers"
)]
pub async fn create_transfer(
    State(state): State<Arc<AppState>>,
    Extension(payload): Extension<Payload>,
    ValidatedJson(req): ValidatedJson<TransferRequest>,
) -> ApiResult<TransferTxResult> {
    // 1. Body already validated by the extractor
    let currency: Currency = req.currency.parse().map_err(ApiError::bad_request)?;
    if req.from_account_id == req.to_account_id {
        return ApiError::bad_request("from_account_id and to_account_id must differ").into_err();
    }

    // 2. Ownership of the source account
    let user = current_user(&state, &payload).await?;
    let mut q = state.store.acquire().await?;
    let from = owned_account(q.as_mut(), &user, req.from_account_id).await?;

    // 3. Currencies
    ensure_currency(&from, currency)?;
    account_in_currency(q.as_mut(), req.to_account_id, currency).await?;

    // 4. Balance
    if from.balance < req.amount {
        return ApiError::new(
            StatusCode::BAD_REQUEST,
            error_codes::INSUFFICIENT_BALANCE,
            format!(
                "Account {} does not have sufficient funds for {} transfer",
                from.id, req.amount
            ),
        )
        .into_err();
    }
    drop(q);

    let arg = TransferTxParams {
        from_account_id: req.from_account_id,
        to_account_id: req.to_account_id,
        amount: req.amount,
    };
    match transfer_tx(state.store.as_ref(), arg).await {
        Ok(result) => {
            tracing::info!(
                transfer_id = result.transfer.id,
                from_account_id = arg.from_account_id,
                to_account_id = arg.to_account_id,
                amount = arg.amount,
                "Transfer completed"
            );
            ok(result)
        }
        Err(e) => {
            tracing::error!(
                from_account_id = arg.from_account_id,
                to_account_id = arg.to_account_id,
                amount = arg.amount,
                "Transfer failed: {}",
                e
            );
            Err(ApiError::internal("Transfer failed"))
        }
    }
}

/// Get a transfer the caller is party to
///
/// GET /api/v1/transfers/{id}
#[utoipa::path(
    get,
    path = "/api/v1/transfers/{id}",
    params(
        ("id" = i64, Path, description = "Transfer ID")
    ),
    responses(
        (status = 200, description = "Transfer details", body = ApiResponse<Transfer>),
        (status = 401, description = "Caller owns neither side of the transfer"),
        (status = 404, description = "Transfer not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Transfers"
)]
pub async fn get_transfer(
    State(state): State<Arc<AppState>>,
    Extension(payload): Extension<Payload>,
    Path(id): Path<i64>,
) -> ApiResult<Transfer> {
    let user = current_user(&state, &payload).await?;
    let mut q = state.store.acquire().await?;

    let transfer = q.get_transfer(id).await.map_err(|e| {
        if e.is_not_found() {
            ApiError::not_found(format!("Transfer {} not found", id))
        } else {
            e.into()
        }
    })?;

    let from = q.get_account(transfer.from_account_id).await?;
    let to = q.get_account(transfer.to_account_id).await?;
    if from.owner != user.id && to.owner != user.id {
        return ApiError::unauthorized(
            error_codes::ACCOUNT_NOT_OWNED,
            "Transfer does not involve the authenticated user's accounts",
        )
        .into_err();
    }
    ok(transfer)
}
