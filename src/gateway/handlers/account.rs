//! Account handlers (create, get, list, entries)

use std::sync::Arc;

use axum::{
    Extension,
    extract::{Path, State},
};

use super::super::state::AppState;
use super::super::types::{
    ApiError, ApiResponse, ApiResult, CreateAccountRequest, PageQuery, ValidatedJson, ValidatedQuery,
    error_codes, ok,
};
use super::current_user;
use crate::ledger::models::{CreateAccountParams, ListAccountsParams, ListEntriesParams};
use crate::ledger::{Account, Currency, Entry, Queries, User};
use crate::token::Payload;

/// Load an account and require the caller to own it
pub(crate) async fn owned_account(
    q: &mut dyn Queries,
    user: &User,
    account_id: i64,
) -> Result<Account, ApiError> {
    let account = q.get_account(account_id).await.map_err(|e| {
        if e.is_not_found() {
            ApiError::not_found(format!("Account {} not found", account_id))
        } else {
            e.into()
        }
    })?;

    if account.owner != user.id {
        return Err(ApiError::unauthorized(
            error_codes::ACCOUNT_NOT_OWNED,
            "Account does not belong to the authenticated user",
        ));
    }
    Ok(account)
}

/// Create an account for the authenticated user
///
/// POST /api/v1/accounts
#[utoipa::path(
    post,
    path = "/api/v1/accounts",
    request_body = CreateAccountRequest,
    responses(
        (status = 200, description = "Account created", body = ApiResponse<Account>),
        (status = 400, description = "Unsupported currency"),
        (status = 401, description = "Authentication failed"),
        (status = 403, description = "Account in this currency already exists"),
        (status = 500, description = "Internal server error")
    ),
    security(("bearer_auth" = [])),
    tag = "Accounts"
)]
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    Extension(payload): Extension<Payload>,
    ValidatedJson(req): ValidatedJson<CreateAccountRequest>,
) -> ApiResult<Account> {
    let currency: Currency = req.currency.parse().map_err(ApiError::bad_request)?;

    let user = current_user(&state, &payload).await?;

    let mut q = state.store.acquire().await?;
    let account = q
        .create_account(CreateAccountParams {
            owner: user.id,
            balance: 0,
            currency,
        })
        .await
        .map_err(|e| {
            if e.violation_kind().is_some() {
                tracing::warn!(owner = user.id, %currency, "Account creation rejected: {}", e);
                ApiError::forbidden(e.to_string())
            } else {
                e.into()
            }
        })?;

    tracing::info!(account_id = account.id, owner = user.id, %currency, "Account created");
    ok(account)
}

/// Get one of the caller's accounts
///
/// GET /api/v1/accounts/{id}
#[utoipa::path(
    get,
    path = "/api/v1/accounts/{id}",
    params(
        ("id" = i64, Path, description = "Account ID")
    ),
    responses(
        (status = 200, description = "Account details", body = ApiResponse<Account>),
        (status = 400, description = "Invalid account id"),
        (status = 401, description = "Not the account owner"),
        (status = 404, description = "Account not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Accounts"
)]
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    Extension(payload): Extension<Payload>,
    Path(id): Path<i64>,
) -> ApiResult<Account> {
    if id < 1 {
        return ApiError::bad_request("id must be >= 1").into_err();
    }

    let user = current_user(&state, &payload).await?;
    let mut q = state.store.acquire().await?;
    let account = owned_account(q.as_mut(), &user, id).await?;
    ok(account)
}

/// List the caller's accounts
///
/// GET /api/v1/accounts?page_id=1&page_size=5
#[utoipa::path(
    get,
    path = "/api/v1/accounts",
    params(PageQuery),
    responses(
        (status = 200, description = "Accounts ordered by id", body = ApiResponse<Vec<Account>>),
        (status = 400, description = "Invalid pagination")
    ),
    security(("bearer_auth" = [])),
    tag = "Accounts"
)]
pub async fn list_accounts(
    State(state): State<Arc<AppState>>,
    Extension(payload): Extension<Payload>,
    ValidatedQuery(page): ValidatedQuery<PageQuery>,
) -> ApiResult<Vec<Account>> {

    let user = current_user(&state, &payload).await?;
    let mut q = state.store.acquire().await?;
    let accounts = q
        .list_accounts(ListAccountsParams {
            owner: user.id,
            limit: page.limit(),
            offset: page.offset(),
        })
        .await?;
    ok(accounts)
}

/// List entries of one of the caller's accounts
///
/// GET /api/v1/accounts/{id}/entries?page_id=1&page_size=5
#[utoipa::path(
    get,
    path = "/api/v1/accounts/{id}/entries",
    params(
        ("id" = i64, Path, description = "Account ID"),
        PageQuery
    ),
    responses(
        (status = 200, description = "Entries ordered by id", body = ApiResponse<Vec<Entry>>),
        (status = 400, description = "Invalid pagination"),
        (status = 401, description = "Not the account owner"),
        (status = 404, description = "Account not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Accounts"
)]
pub async fn list_entries(
    State(state): State<Arc<AppState>>,
    Extension(payload): Extension<Payload>,
    Path(id): Path<i64>,
    ValidatedQuery(page): ValidatedQuery<PageQuery>,
) -> ApiResult<Vec<Entry>> {

    let user = current_user(&state, &payload).await?;
    let mut q = state.store.acquire().await?;
    owned_account(q.as_mut(), &user, id).await?;

    let entries = q
        .list_entries(ListEntriesParams {
            account_id: id,
            limit: page.limit(),
            offset: page.offset(),
        })
        .await?;
    ok(entries)
}
