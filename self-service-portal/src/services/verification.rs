//! Verification session tracking.
//!
//! Sessions live in a [`VerificationStore`]; the service drives workflow
//! creation and result polling against a [`VerificationApi`]. No store entry is
//! held while an Au10tix call is in flight: state is read, the call is made,
//! and the outcome is committed under the entry lock afterwards.

use crate::config::{Au10tixSettings, VerificationSettings};
use crate::error::PortalError;
use crate::models::{ExternalSessionRef, PolledOutcome, SubjectData, VerificationSession, VerificationStatus};
use crate::services::au10tix_client::{resolve_token, PollResult, TokenSource, VerificationApi};
use crate::utils::jwt::decode_unexpired;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use secrecy::ExposeSecret;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Shared map of verification sessions.
pub trait VerificationStore: Send + Sync {
    fn get(&self, id: &Uuid) -> Option<VerificationSession>;

    fn insert(&self, session: VerificationSession);

    /// Mutate one session atomically and return its new state.
    fn update(
        &self,
        id: &Uuid,
        apply: &mut (dyn FnMut(&mut VerificationSession) + Send),
    ) -> Option<VerificationSession>;

    fn list(&self) -> Vec<VerificationSession>;

    /// Drop every session created before `cutoff`; returns how many went.
    fn remove_created_before(&self, cutoff: DateTime<Utc>) -> usize;
}

#[derive(Default)]
pub struct InMemoryVerificationStore {
    sessions: DashMap<Uuid, VerificationSession>,
}

impl InMemoryVerificationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VerificationStore for InMemoryVerificationStore {
    fn get(&self, id: &Uuid) -> Option<VerificationSession> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    fn insert(&self, session: VerificationSession) {
        self.sessions.insert(session.id, session);
    }

    fn update(
        &self,
        id: &Uuid,
        apply: &mut (dyn FnMut(&mut VerificationSession) + Send),
    ) -> Option<VerificationSession> {
        let mut entry = self.sessions.get_mut(id)?;
        apply(entry.value_mut());
        Some(entry.value().clone())
    }

    fn list(&self) -> Vec<VerificationSession> {
        let mut sessions: Vec<_> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }

    fn remove_created_before(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| session.created_at >= cutoff);
        before.saturating_sub(self.sessions.len())
    }
}

#[derive(Debug, Clone)]
pub struct StartedVerification {
    pub verification_id: Uuid,
    /// Empty in demo mode.
    pub session_url: String,
    pub token_source: TokenSource,
}

/// A manual sweep over pending sessions: state before, and what the refresh did.
pub struct PendingCheck {
    pub before: VerificationSession,
    pub outcome: Result<VerificationSession, PortalError>,
}

pub struct VerificationService {
    store: Arc<dyn VerificationStore>,
    api: Arc<dyn VerificationApi>,
    au10tix: Au10tixSettings,
    settings: VerificationSettings,
    refresh_seq: AtomicU64,
}

impl VerificationService {
    pub fn new(
        store: Arc<dyn VerificationStore>,
        api: Arc<dyn VerificationApi>,
        au10tix: Au10tixSettings,
        settings: VerificationSettings,
    ) -> Self {
        Self {
            store,
            api,
            au10tix,
            settings,
            refresh_seq: AtomicU64::new(0),
        }
    }

    pub fn au10tix_settings(&self) -> &Au10tixSettings {
        &self.au10tix
    }

    pub fn get(&self, id: &Uuid) -> Result<VerificationSession, PortalError> {
        self.store
            .get(id)
            .ok_or_else(|| PortalError::NotFound("Verification session".to_string()))
    }

    pub fn list(&self) -> Vec<VerificationSession> {
        self.store.list()
    }

    #[tracing::instrument(skip(self, subject))]
    pub async fn start(&self, subject: SubjectData) -> Result<StartedVerification, PortalError> {
        let now = Utc::now();
        let resolved = resolve_token(&self.au10tix)?;

        if resolved.source.is_demo() {
            let session = VerificationSession::new(subject, None, now);
            let verification_id = session.id;
            self.store.insert(session);

            metrics::counter!("verification_sessions_started_total", "mode" => "demo").increment(1);
            tracing::warn!(
                verification_id = %verification_id,
                token_source = "static_fallback",
                "Started verification in demo mode, no Au10tix workflow created"
            );
            return Ok(StartedVerification {
                verification_id,
                session_url: String::new(),
                token_source: resolved.source,
            });
        }

        let token = resolved.token.expose_secret();
        let claims = decode_unexpired(token, now)?;
        let api_base = claims.api_base_url(&self.au10tix.base_url);

        let workflow = self.api.create_workflow(api_base, token, &subject).await?;

        let external = ExternalSessionRef {
            id: workflow.session_id.clone(),
            url: workflow.session_url.clone(),
        };
        let session = VerificationSession::new(subject, Some(external), Utc::now());
        let verification_id = session.id;
        self.store.insert(session);

        metrics::counter!("verification_sessions_started_total", "mode" => "live").increment(1);
        tracing::info!(
            verification_id = %verification_id,
            external_session_id = ?workflow.session_id,
            token_source = "configuration",
            "Started verification"
        );

        Ok(StartedVerification {
            verification_id,
            session_url: workflow.session_url,
            token_source: resolved.source,
        })
    }

    /// Poll Au10tix for the session's result and fold it in.
    ///
    /// Only token resolution failures are returned; every other problem leaves
    /// the session as it was.
    pub async fn refresh(&self, id: &Uuid) -> Result<VerificationSession, PortalError> {
        let seq = self.refresh_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let current = self.get(id)?;

        if current.status.is_terminal() || current.external.is_none() {
            return Ok(current);
        }
        let Some(external_id) = current.external.as_ref().and_then(|e| e.id.clone()) else {
            tracing::debug!(verification_id = %id, "No Au10tix session id to poll");
            return Ok(current);
        };

        let resolved = resolve_token(&self.au10tix)?;
        if resolved.source.is_demo() {
            return Ok(current);
        }
        let token = resolved.token.expose_secret();
        let claims = decode_unexpired(token, Utc::now())?;
        let api_base = claims.api_base_url(&self.au10tix.base_url);

        match self.api.fetch_result(api_base, token, &external_id).await {
            Ok(PollResult::Found { endpoint, body }) => {
                tracing::info!(verification_id = %id, endpoint = %endpoint, "Au10tix result received");
                let outcome = PolledOutcome::from_body(body);
                match self.commit(id, seq, outcome, Utc::now()) {
                    Some(updated) => {
                        metrics::counter!("verification_refresh_total", "outcome" => "updated")
                            .increment(1);
                        Ok(updated)
                    }
                    None => self.get(id),
                }
            }
            Ok(PollResult::NotReady { last_error }) => {
                tracing::info!(
                    verification_id = %id,
                    last_error = ?last_error,
                    "No Au10tix endpoint had a result, keeping session pending"
                );
                metrics::counter!("verification_refresh_total", "outcome" => "not_ready").increment(1);
                Ok(current)
            }
            Err(e) => {
                tracing::warn!(verification_id = %id, error = %e, "Au10tix polling failed");
                metrics::counter!("verification_refresh_total", "outcome" => "error").increment(1);
                Ok(current)
            }
        }
    }

    /// Apply `outcome` unless the session went terminal or a later refresh
    /// already committed. Returns the new state when applied.
    fn commit(
        &self,
        id: &Uuid,
        seq: u64,
        outcome: PolledOutcome,
        now: DateTime<Utc>,
    ) -> Option<VerificationSession> {
        let mut outcome = Some(outcome);
        let mut applied = false;
        let updated = self.store.update(id, &mut |session| {
            if session.status.is_terminal() || seq < session.refresh_seq {
                return;
            }
            if let Some(outcome) = outcome.take() {
                session.apply(outcome, now);
                session.refresh_seq = seq;
                applied = true;
            }
        })?;

        if !applied {
            tracing::debug!(verification_id = %id, seq, "Discarded stale refresh");
            metrics::counter!("verification_refresh_total", "outcome" => "stale").increment(1);
            return None;
        }
        Some(updated)
    }

    fn is_auto_pollable(&self, session: &VerificationSession, now: DateTime<Utc>) -> bool {
        session.status == VerificationStatus::Pending
            && session.external.is_some()
            && session.age(now) < self.settings.auto_poll_max_age()
    }

    /// Background tick: refresh young pending sessions, absorbing every error.
    pub async fn poll_pending(&self, now: DateTime<Utc>) -> usize {
        let candidates: Vec<Uuid> = self
            .store
            .list()
            .into_iter()
            .filter(|session| self.is_auto_pollable(session, now))
            .map(|session| session.id)
            .collect();

        for id in &candidates {
            if let Err(e) = self.refresh(id).await {
                tracing::warn!(verification_id = %id, error = %e, "Background poll failed");
            }
        }

        if !candidates.is_empty() {
            tracing::info!(count = candidates.len(), "Polled pending verification sessions");
        }
        candidates.len()
    }

    /// Refresh every pending session with an Au10tix reference, regardless of age.
    pub async fn check_pending(&self) -> Vec<PendingCheck> {
        let pending: Vec<VerificationSession> = self
            .store
            .list()
            .into_iter()
            .filter(|s| s.status == VerificationStatus::Pending && s.external.is_some())
            .collect();

        let mut checks = Vec::with_capacity(pending.len());
        for before in pending {
            let outcome = self.refresh(&before.id).await;
            checks.push(PendingCheck { before, outcome });
        }
        checks
    }

    /// Remove sessions older than the retention window, whatever their status.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let removed = self
            .store
            .remove_created_before(now - self.settings.retention());

        if removed > 0 {
            metrics::counter!("verification_sessions_swept_total").increment(removed as u64);
            tracing::info!(removed, "Swept expired verification sessions");
        }
        removed
    }
}
