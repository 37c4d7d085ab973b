//! Request and response DTOs
//!
//! Input structs derive `Validate` and reach handlers through the validating extractors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::ledger::{Currency, User};

fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        Ok(())
    } else {
        Err(ValidationError::new("username_charset"))
    }
}

fn validate_currency(currency: &str) -> Result<(), ValidationError> {
    currency
        .parse::<Currency>()
        .map(|_| ())
        .map_err(|_| ValidationError::new("unsupported_currency"))
}

/// Flatten validator output into one line for `ApiResponse.msg`
pub fn describe(errors: &ValidationErrors) -> String {
    let mut fields: Vec<String> = errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let codes: Vec<String> = errs.iter().map(|e| e.code.to_string()).collect();
            format!("{}: {}", field, codes.join(","))
        })
        .collect();
    fields.sort();
    format!("Invalid parameters: {}", fields.join("; "))
}

// ============================================================================
// Users
// ============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateUserRequest {
    #[validate(length(min = 3, max = 64), custom(function = "validate_username"))]
    #[schema(example = "alice")]
    pub username: String,
    #[validate(length(min = 6))]
    #[schema(example = "secret123")]
    pub password: String,
    #[validate(length(min = 1))]
    #[schema(example = "Alice Liddell")]
    pub full_name: String,
    #[validate(email)]
    #[schema(example = "alice@example.com")]
    pub email: String,
}

/// User as returned by the API (no password hash)
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub password_changed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            username: user.username,
            full_name: user.full_name,
            email: user.email,
            password_changed_at: user.password_changed_at,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginUserRequest {
    #[validate(length(min = 3, max = 64), custom(function = "validate_username"))]
    #[schema(example = "alice")]
    pub username: String,
    #[validate(length(min = 6))]
    #[schema(example = "secret123")]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginUserResponse {
    pub access_token: String,
    pub access_token_expires_at: DateTime<Utc>,
    pub user: UserResponse,
}

// ============================================================================
// Accounts & entries
// ============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateAccountRequest {
    #[validate(custom(function = "validate_currency"))]
    #[schema(example = "USD")]
    pub currency: String,
}

/// `page_id` is 1-based
#[derive(Debug, Deserialize, Validate, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    #[validate(range(min = 1))]
    pub page_id: i32,
    #[validate(range(min = 5, max = 10))]
    pub page_size: i32,
}

impl PageQuery {
    pub fn limit(&self) -> i64 {
        i64::from(self.page_size)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page_id - 1) * i64::from(self.page_size)
    }
}

// ============================================================================
// Transfers
// ============================================================================

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct TransferRequest {
    #[validate(range(min = 1))]
    pub from_account_id: i64,
    #[validate(range(min = 1))]
    pub to_account_id: i64,
    #[validate(range(min = 1))]
    pub amount: i64,
    #[validate(custom(function = "validate_currency"))]
    #[schema(example = "USD")]
    pub currency: String,
}
