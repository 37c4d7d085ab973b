//! OpenAPI / Swagger UI Documentation
//!
//! - Swagger UI: `http://localhost:8080/docs`
//! - OpenAPI JSON: `http://localhost:8080/api-docs/openapi.json`

use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::gateway::handlers::HealthResponse;
use crate::gateway::types::{
    CreateAccountRequest, CreateUserRequest, LoginUserRequest, LoginUserResponse,
    TransferRequest, UserResponse,
};
use crate::ledger::{Account, Currency, Entry, Transfer, TransferTxResult};

/// Bearer token security scheme (JWT or encrypted `sb1.local.` token, depending on configuration)
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

/// Main API Documentation struct
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Simple Bank API",
        version = "0.1.0",
        description = "Accounts, entries and atomic funds transfers.",
        license(
            name = "MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Development"),
    ),
    paths(
        crate::gateway::handlers::health::health_check,
        crate::user_auth::handlers::create_user,
        crate::user_auth::handlers::login_user,
        crate::gateway::handlers::account::create_account,
        crate::gateway::handlers::account::get_account,
        crate::gateway::handlers::account::list_accounts,
        crate::gateway::handlers::account::list_entries,
        crate::gateway::handlers::transfer::create_transfer,
        crate::gateway::handlers::transfer::get_transfer,
    ),
    components(
        schemas(
            HealthResponse,
            Currency,
            Account,
            Entry,
            Transfer,
            TransferTxResult,
            CreateUserRequest,
            UserResponse,
            LoginUserRequest,
            LoginUserResponse,
            CreateAccountRequest,
            TransferRequest,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Users", description = "Registration and login"),
        (name = "Accounts", description = "Accounts and entries (auth required)"),
        (name = "Transfers", description = "Funds transfers (auth required)"),
        (name = "System", description = "Health checks")
    )
)]
pub struct ApiDoc;
