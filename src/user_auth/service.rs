use std::sync::Arc;

use chrono::Duration;
use thiserror::Error;

use super::password::{PasswordError, check_password, hash_password};
use crate::gateway::types::{CreateUserRequest, LoginUserRequest, LoginUserResponse};
use crate::ledger::models::CreateUserParams;
use crate::ledger::{LedgerError, Store, User, ViolationKind};
use crate::token::{Payload, TokenError, TokenMaker};

#[derive(Error, Debug)]
pub enum UserAuthError {
    #[error("Username or email already exists")]
    UserExists,

    #[error("User not found")]
    UserNotFound,

    #[error("Invalid username or password")]
    WrongPassword,

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

pub struct UserAuthService {
    store: Arc<dyn Store>,
    token_maker: Arc<dyn TokenMaker>,
    access_token_duration: Duration,
}

impl UserAuthService {
    pub fn new(
        store: Arc<dyn Store>,
        token_maker: Arc<dyn TokenMaker>,
        access_token_duration: Duration,
    ) -> Self {
        Self {
            store,
            token_maker,
            access_token_duration,
        }
    }

    /// Register a new user
    pub async fn register(&self, req: CreateUserRequest) -> Result<User, UserAuthError> {
        // 1. Hash password
        let hashed_password = hash_password(&req.password)?;

        // 2. Insert
        let mut q = self.store.acquire().await?;
        q.create_user(CreateUserParams {
            username: req.username,
            hashed_password,
            full_name: req.full_name,
            email: req.email,
        })
        .await
        .map_err(|e| match e.violation_kind() {
            Some(ViolationKind::Unique) => UserAuthError::UserExists,
            _ => UserAuthError::Ledger(e),
        })
    }

    /// Login user and issue an access token
    pub async fn login(&self, req: LoginUserRequest) -> Result<LoginUserResponse, UserAuthError> {
        // 1. Find user
        let mut q = self.store.acquire().await?;
        let user = q.get_user(&req.username).await.map_err(|e| {
            if e.is_not_found() {
                UserAuthError::UserNotFound
            } else {
                UserAuthError::Ledger(e)
            }
        })?;

        // 2. Verify password
        check_password(&req.password, &user.hashed_password).map_err(|e| match e {
            PasswordError::Mismatch => UserAuthError::WrongPassword,
            other => UserAuthError::Password(other),
        })?;

        // 3. Issue token
        let (access_token, payload) = self
            .token_maker
            .create_token(&user.username, self.access_token_duration)?;

        Ok(LoginUserResponse {
            access_token,
            access_token_expires_at: payload.expired_at,
            user: user.into(),
        })
    }

    /// Verify an access token
    pub fn verify_token(&self, token: &str) -> Result<Payload, TokenError> {
        self.token_maker.verify_token(token)
    }
}
