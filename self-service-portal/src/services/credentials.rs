//! SDO credential bookkeeping over the caller's session.
//!
//! A credential can live in the session in three shapes. [`CredentialStore::resolve`]
//! accepts all of them, in a fixed order, so callers never care which one wrote it.

use crate::config::CredentialStorage;
use crate::models::Credential;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use secrecy::{ExposeSecret, Secret};
use std::sync::Arc;
use tower_sessions::Session;
use uuid::Uuid;

pub const SDO_TOKEN_KEY: &str = "sdo_token";
pub const SDO_URL_KEY: &str = "sdo_url";
pub const SDO_EMAIL_KEY: &str = "sdo_email";
pub const SDO_ACQUIRED_AT_KEY: &str = "sdo_acquired_at";
pub const SDO_AUTHENTICATED_KEY: &str = "sdo_authenticated";
pub const SDO_TOKEN_REF_KEY: &str = "sdo_token_ref";
pub const SDO_CREDENTIAL_REF_KEY: &str = "sdo_credential_ref";

const ALL_KEYS: [&str; 7] = [
    SDO_TOKEN_KEY,
    SDO_URL_KEY,
    SDO_EMAIL_KEY,
    SDO_ACQUIRED_AT_KEY,
    SDO_AUTHENTICATED_KEY,
    SDO_TOKEN_REF_KEY,
    SDO_CREDENTIAL_REF_KEY,
];

/// String values scoped to one caller's session.
#[async_trait]
pub trait SessionValues: Send + Sync {
    async fn get_value(&self, key: &str) -> Option<String>;
    async fn set_value(&self, key: &str, value: &str) -> Result<(), anyhow::Error>;
    async fn remove_value(&self, key: &str) -> Result<(), anyhow::Error>;
}

#[async_trait]
impl SessionValues for Session {
    async fn get_value(&self, key: &str) -> Option<String> {
        self.get::<String>(key).await.unwrap_or(None)
    }

    async fn set_value(&self, key: &str, value: &str) -> Result<(), anyhow::Error> {
        self.insert(key, value)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to write session key {}: {}", key, e))
    }

    async fn remove_value(&self, key: &str) -> Result<(), anyhow::Error> {
        self.remove::<serde_json::Value>(key)
            .await
            .map(|_| ())
            .map_err(|e| anyhow::anyhow!("Failed to remove session key {}: {}", key, e))
    }
}

/// Process-wide table keyed by opaque reference ids. Entries are write-once.
#[async_trait]
pub trait ReferenceTable<V>: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<V>, anyhow::Error>;
    async fn set(&self, id: &str, value: V) -> Result<(), anyhow::Error>;
    async fn delete(&self, id: &str) -> Result<(), anyhow::Error>;
}

pub struct InMemoryReferenceTable<V> {
    entries: DashMap<String, V>,
}

impl<V> Default for InMemoryReferenceTable<V> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<V> InMemoryReferenceTable<V> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl<V> ReferenceTable<V> for InMemoryReferenceTable<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, id: &str) -> Result<Option<V>, anyhow::Error> {
        Ok(self.entries.get(id).map(|entry| entry.value().clone()))
    }

    async fn set(&self, id: &str, value: V) -> Result<(), anyhow::Error> {
        match self.entries.entry(id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(anyhow::anyhow!("Reference {} is already written", id))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(value);
                Ok(())
            }
        }
    }

    async fn delete(&self, id: &str) -> Result<(), anyhow::Error> {
        self.entries.remove(id);
        Ok(())
    }
}

#[derive(Clone)]
pub struct CredentialStore {
    tokens: Arc<dyn ReferenceTable<Secret<String>>>,
    credentials: Arc<dyn ReferenceTable<Credential>>,
    storage: CredentialStorage,
}

impl CredentialStore {
    pub fn new(
        tokens: Arc<dyn ReferenceTable<Secret<String>>>,
        credentials: Arc<dyn ReferenceTable<Credential>>,
        storage: CredentialStorage,
    ) -> Self {
        Self {
            tokens,
            credentials,
            storage,
        }
    }

    pub fn in_memory(storage: CredentialStorage) -> Self {
        Self::new(
            Arc::new(InMemoryReferenceTable::default()),
            Arc::new(InMemoryReferenceTable::default()),
            storage,
        )
    }

    /// The session's complete credential, if it has one.
    ///
    /// Never fails: missing, partial or unreadable data is simply absent.
    pub async fn resolve(&self, session: &dyn SessionValues) -> Option<Credential> {
        let url = session.get_value(SDO_URL_KEY).await;
        let email = session.get_value(SDO_EMAIL_KEY).await;
        let acquired_at = session
            .get_value(SDO_ACQUIRED_AT_KEY)
            .await
            .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
            .map(|at| at.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        // Direct
        if let (Some(token), Some(url), Some(email)) = (
            session.get_value(SDO_TOKEN_KEY).await,
            url.as_deref(),
            email.as_deref(),
        ) {
            if let Some(credential) = Credential::from_parts(&token, url, email, acquired_at) {
                return Some(credential);
            }
        }

        // Token by reference
        if let (Some(reference), Some(url), Some(email)) = (
            session.get_value(SDO_TOKEN_REF_KEY).await,
            url.as_deref(),
            email.as_deref(),
        ) {
            match self.tokens.get(&reference).await {
                Ok(Some(token)) => {
                    if let Some(credential) =
                        Credential::from_parts(token.expose_secret(), url, email, acquired_at)
                    {
                        return Some(credential);
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(error = %e, "Token reference lookup failed"),
            }
        }

        // Full reference
        if let Some(reference) = session.get_value(SDO_CREDENTIAL_REF_KEY).await {
            match self.credentials.get(&reference).await {
                Ok(found) => return found,
                Err(e) => tracing::warn!(error = %e, "Credential reference lookup failed"),
            }
        }

        None
    }

    /// Write a new credential into the session using the configured shape.
    pub async fn store(
        &self,
        session: &dyn SessionValues,
        credential: &Credential,
    ) -> Result<(), anyhow::Error> {
        self.invalidate(session).await;

        let acquired_at = credential.acquired_at().to_rfc3339();
        match self.storage {
            CredentialStorage::Direct => {
                session.set_value(SDO_TOKEN_KEY, credential.bearer()).await?;
                session.set_value(SDO_URL_KEY, credential.base_url()).await?;
                session.set_value(SDO_EMAIL_KEY, credential.email()).await?;
                session.set_value(SDO_ACQUIRED_AT_KEY, &acquired_at).await?;
            }
            CredentialStorage::TokenReference => {
                let reference = Uuid::new_v4().to_string();
                self.tokens
                    .set(&reference, credential.token().clone())
                    .await?;
                session.set_value(SDO_TOKEN_REF_KEY, &reference).await?;
                session.set_value(SDO_URL_KEY, credential.base_url()).await?;
                session.set_value(SDO_EMAIL_KEY, credential.email()).await?;
                session.set_value(SDO_ACQUIRED_AT_KEY, &acquired_at).await?;
            }
            CredentialStorage::FullReference => {
                let reference = Uuid::new_v4().to_string();
                self.credentials.set(&reference, credential.clone()).await?;
                session
                    .set_value(SDO_CREDENTIAL_REF_KEY, &reference)
                    .await?;
            }
        }
        session.set_value(SDO_AUTHENTICATED_KEY, "true").await?;

        tracing::info!(
            email = %credential.email(),
            base_url = %credential.base_url(),
            storage = ?self.storage,
            token_length = credential.token_len(),
            "Stored SDO credential"
        );
        Ok(())
    }

    /// Forget every representation of the session's credential.
    pub async fn invalidate(&self, session: &dyn SessionValues) {
        if let Some(reference) = session.get_value(SDO_TOKEN_REF_KEY).await {
            if let Err(e) = self.tokens.delete(&reference).await {
                tracing::warn!(error = %e, "Failed to delete token reference");
            }
        }
        if let Some(reference) = session.get_value(SDO_CREDENTIAL_REF_KEY).await {
            if let Err(e) = self.credentials.delete(&reference).await {
                tracing::warn!(error = %e, "Failed to delete credential reference");
            }
        }
        for key in ALL_KEYS {
            if let Err(e) = session.remove_value(key).await {
                tracing::warn!(error = %e, "Failed to clear SDO session key");
            }
        }
    }
}
