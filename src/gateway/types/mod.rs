//! Gateway types module
//!
//! ## Submodules
//! - [`extract`]: `ValidatedJson` / `ValidatedQuery` extractors
//! - [`requests`]: Request/response DTOs with input validation
//! - [`response`]: Response envelope, `ApiError` and error codes

pub mod extract;
pub mod requests;
pub mod response;

// Re-export commonly used types at module root
pub use extract::{ValidatedJson, ValidatedQuery};
pub use requests::{
    CreateAccountRequest, CreateUserRequest, LoginUserRequest, LoginUserResponse, PageQuery,
    TransferRequest, UserResponse, describe,
};
pub use response::{ApiError, ApiResponse, ApiResult, error_codes, ok};
