pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
pub mod utils;
pub mod workers;

use config::Settings;
use error::PortalError;
use services::{
    Au10tixClient, CredentialStore, InMemoryVerificationStore, SdoClient, VerificationService,
};
use std::sync::Arc;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub credentials: Arc<CredentialStore>,
    pub sdo: Arc<SdoClient>,
    pub verification: Arc<VerificationService>,
}

impl AppState {
    pub fn new(
        settings: Arc<Settings>,
        credentials: Arc<CredentialStore>,
        sdo: Arc<SdoClient>,
        verification: Arc<VerificationService>,
    ) -> Self {
        Self {
            settings,
            credentials,
            sdo,
            verification,
        }
    }

    /// Wire up in-memory stores and real HTTP clients from configuration.
    pub fn from_settings(settings: Settings) -> Result<Self, PortalError> {
        let credentials = Arc::new(CredentialStore::in_memory(settings.sdo.credential_storage));
        let sdo = Arc::new(SdoClient::new(settings.sdo.clone())?);
        let verification = Arc::new(VerificationService::new(
            Arc::new(InMemoryVerificationStore::new()),
            Arc::new(Au10tixClient::new(&settings.au10tix)?),
            settings.au10tix.clone(),
            settings.verification.clone(),
        ));

        Ok(Self::new(Arc::new(settings), credentials, sdo, verification))
    }
}
