//! HTTP handlers
//!
//! - [`health`]: store health check
//! - [`account`]: accounts and their entries
//! - [`transfer`]: funds transfers

pub mod account;
pub mod health;
pub mod transfer;

pub use account::{create_account, get_account, list_accounts, list_entries};
pub use health::{HealthResponse, health_check};
pub use transfer::{create_transfer, get_transfer};

use super::state::AppState;
use super::types::{ApiError, error_codes};
use crate::ledger::User;
use crate::token::Payload;

/// Resolve the authenticated user from the verified token payload
pub(crate) async fn current_user(state: &AppState, payload: &Payload) -> Result<User, ApiError> {
    let mut q = state.store.acquire().await?;
    q.get_user(&payload.username).await.map_err(|e| {
        if e.is_not_found() {
            ApiError::unauthorized(error_codes::AUTH_FAILED, "Token user no longer exists")
        } else {
            e.into()
        }
    })
}
