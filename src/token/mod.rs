//! Access tokens
//!
//! Two interchangeable schemes behind [`TokenMaker`]:
//! - [`JwtMaker`]: HS256 signed JWT
//! - [`PasetoMaker`]: PASETO-like `sb1.local.` token encrypted with XChaCha20-Poly1305
//!
//! Verification checks integrity first and expiry second.

pub mod jwt;
pub mod paseto;
pub mod payload;

use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use jwt::JwtMaker;
pub use paseto::PasetoMaker;
pub use payload::Payload;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token has expired")]
    Expired,

    #[error("token is invalid")]
    Invalid,

    #[error("invalid key size: need {expected} bytes, got {actual}")]
    InvalidKeySize { expected: usize, actual: usize },

    #[error("token creation failed: {0}")]
    Create(String),
}

pub trait TokenMaker: Send + Sync {
    /// Issue a token for `username` valid for `duration`
    fn create_token(
        &self,
        username: &str,
        duration: Duration,
    ) -> Result<(String, Payload), TokenError>;

    fn verify_token(&self, token: &str) -> Result<Payload, TokenError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenScheme {
    Jwt,
    #[default]
    Paseto,
}

/// Build the configured token maker
pub fn new_token_maker(
    scheme: TokenScheme,
    key: &str,
) -> Result<Arc<dyn TokenMaker>, TokenError> {
    Ok(match scheme {
        TokenScheme::Jwt => Arc::new(JwtMaker::new(key)?),
        TokenScheme::Paseto => Arc::new(PasetoMaker::new(key)?),
    })
}
