use std::sync::Arc;

use chrono::Duration;

use crate::ledger::Store;
use crate::token::TokenMaker;
use crate::user_auth::UserAuthService;

/// Gateway application state (shared by every request)
#[derive(Clone)]
pub struct AppState {
    /// Ledger store (PostgreSQL or in-memory)
    pub store: Arc<dyn Store>,
    /// Registration, login and token verification
    pub user_auth: Arc<UserAuthService>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        token_maker: Arc<dyn TokenMaker>,
        access_token_duration: Duration,
    ) -> Self {
        let user_auth = Arc::new(UserAuthService::new(
            store.clone(),
            token_maker,
            access_token_duration,
        ));
        Self { store, user_auth }
    }
}
