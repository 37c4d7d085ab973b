use axum::extract::State;
use std::sync::Arc;

use super::service::UserAuthError;
use crate::gateway::state::AppState;
use crate::gateway::types::{
    ApiError, ApiResponse, ApiResult, CreateUserRequest, LoginUserRequest, LoginUserResponse,
    UserResponse, ValidatedJson, error_codes, ok,
};

impl From<UserAuthError> for ApiError {
    fn from(e: UserAuthError) -> Self {
        match e {
            UserAuthError::UserExists => ApiError::conflict("Username or email already exists"),
            UserAuthError::UserNotFound => ApiError::not_found("User not found"),
            UserAuthError::WrongPassword => ApiError::unauthorized(
                error_codes::INVALID_CREDENTIALS,
                "Invalid username or password",
            ),
            UserAuthError::Ledger(e) => e.into(),
            other => {
                tracing::error!("User auth failure: {:?}", other);
                ApiError::internal("Internal server error")
            }
        }
    }
}

/// Register a new user
///
/// POST /api/v1/users
#[utoipa::path(
    post,
    path = "/api/v1/users",
    request_body = CreateUserRequest,
    responses(
        (status = 200, description = "User created", body = ApiResponse<UserResponse>),
        (status = 400, description = "Invalid input"),
        (status = 409, description = "Username or email already exists"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Users"
)]
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<CreateUserRequest>,
) -> ApiResult<UserResponse> {

    let username = req.username.clone();
    match state.user_auth.register(req).await {
        Ok(user) => {
            tracing::info!(username = %user.username, "User created");
            ok(user.into())
        }
        Err(e) => {
            tracing::warn!(username = %username, "Registration failed: {}", e);
            Err(e.into())
        }
    }
}

/// Login user
///
/// POST /api/v1/users/login
#[utoipa::path(
    post,
    path = "/api/v1/users/login",
    request_body = LoginUserRequest,
    responses(
        (status = 200, description = "Login successful", body = ApiResponse<LoginUserResponse>),
        (status = 400, description = "Invalid input"),
        (status = 401, description = "Invalid credentials"),
        (status = 404, description = "User not found"),
        (status = 500, description = "Internal server error")
    ),
    tag = "Users"
)]
pub async fn login_user(
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<LoginUserRequest>,
) -> ApiResult<LoginUserResponse> {

    match state.user_auth.login(req).await {
        Ok(resp) => ok(resp),
        Err(e) => {
            tracing::warn!("Login failed: {}", e);
            Err(e.into())
        }
    }
}
