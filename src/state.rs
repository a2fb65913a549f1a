//! Shared application state handed to every handler.

use std::sync::Arc;

use axum::extract::FromRef;

use crate::{
    config::Config,
    db::DbPool,
    error::AppError,
    services::{
        ai_provider::{self, AiProvider},
        identity_service::IdentityClient,
        stripe_service::StripeClient,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<Config>,
    pub ai: Arc<dyn AiProvider>,
    pub stripe: StripeClient,
    pub identity: IdentityClient,
}

impl AppState {
    /// Build the third-party clients from configuration around an existing pool.
    pub fn new(pool: DbPool, config: Config) -> Result<Self, AppError> {
        let ai = ai_provider::provider_from_config(&config)?;
        let stripe = StripeClient::from_config(&config)?;
        let identity = IdentityClient::from_config(&config)?;

        Ok(Self {
            pool,
            config: Arc::new(config),
            ai,
            stripe,
            identity,
        })
    }
}

impl FromRef<AppState> for DbPool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}
