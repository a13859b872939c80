use std::{sync::Arc, time::Duration as StdDuration};

use chrono::Duration;
use thiserror::Error;
use uuid::Uuid;

use super::{
    clock::Clock,
    jwt::{JwtError, JwtService, SessionClaims},
    store::{NewSession, SessionStore, StoreError, UserDirectory, with_deadline},
};
use crate::db::{sessions::AuthSession, users::User};

pub const DEFAULT_SESSION_TTL: Duration = Duration::days(7);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("credential signature is invalid")]
    InvalidCredentialSignature,
    #[error("credential has expired")]
    CredentialExpired,
    #[error("credential is malformed")]
    MalformedCredential,
    #[error("session has been revoked")]
    SessionRevoked,
    #[error("no active session for credential")]
    NotFound,
    #[error("durable store unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("failed to sign credential")]
    Signing(#[source] JwtError),
    #[error(transparent)]
    Store(StoreError),
}

impl SessionError {
    /// Only store outages are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::UpstreamUnavailable(_))
    }
}

impl From<StoreError> for SessionError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Unavailable(reason) => SessionError::UpstreamUnavailable(reason),
            other => SessionError::Store(other),
        }
    }
}

impl From<JwtError> for SessionError {
    fn from(error: JwtError) -> Self {
        match error {
            JwtError::InvalidSignature => SessionError::InvalidCredentialSignature,
            JwtError::TokenExpired => SessionError::CredentialExpired,
            JwtError::InvalidToken => SessionError::MalformedCredential,
            other => SessionError::Signing(other),
        }
    }
}

/// Request context recorded on a session row. Never used for authorization.
#[derive(Debug, Clone, Default)]
pub struct SessionMetadata {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_info: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub credential: String,
    pub session: AuthSession,
}

#[derive(Debug, Clone)]
pub struct ValidatedSession {
    pub user: User,
    pub session: AuthSession,
}

pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    users: Arc<dyn UserDirectory>,
    jwt: Arc<JwtService>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    store_timeout: StdDuration,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        users: Arc<dyn UserDirectory>,
        jwt: Arc<JwtService>,
        clock: Arc<dyn Clock>,
        ttl: Duration,
        store_timeout: StdDuration,
    ) -> Self {
        Self {
            store,
            users,
            jwt,
            clock,
            ttl,
            store_timeout,
        }
    }

    pub async fn issue_session(
        &self,
        user: &User,
        metadata: &SessionMetadata,
    ) -> Result<IssuedSession, SessionError> {
        let issued_at = self.clock.now();
        let expires_at = issued_at + self.ttl;
        let claims = SessionClaims::new(user.id, user.telegram_id, issued_at, expires_at);
        let credential = self.jwt.encode_session(&claims)?;

        let session = with_deadline(
            self.store_timeout,
            self.store.insert(NewSession {
                user_id: user.id,
                token: &credential,
                user_agent: metadata.user_agent.as_deref(),
                device_info: metadata.device_info.as_deref(),
                ip_address: metadata.ip_address.as_deref(),
                expires_at,
            }),
        )
        .await?;

        tracing::info!(user_id = %user.id, session_id = %session.id, "issued session");

        Ok(IssuedSession {
            credential,
            session,
        })
    }

    pub async fn validate_session(&self, credential: &str) -> Result<ValidatedSession, SessionError> {
        let claims = self.jwt.decode_session(credential)?;

        let session = with_deadline(self.store_timeout, self.store.find_active(credential))
            .await?
            .ok_or(SessionError::SessionRevoked)?;

        if session.user_id != claims.sub {
            tracing::warn!(session_id = %session.id, "session owner does not match credential subject");
            return Err(SessionError::SessionRevoked);
        }

        if session.is_expired(self.clock.now()) {
            return Err(SessionError::CredentialExpired);
        }

        let user = with_deadline(self.store_timeout, self.users.find_by_id(claims.sub))
            .await?
            .ok_or(SessionError::SessionRevoked)?;

        Ok(ValidatedSession { user, session })
    }

    /// Deactivates the session for `credential`. An already inactive session is
    /// reported as [`SessionError::NotFound`] and stays inactive.
    pub async fn revoke_session(&self, credential: &str) -> Result<(), SessionError> {
        let claims = self.jwt.decode_session(credential)?;

        let revoked =
            with_deadline(self.store_timeout, self.store.deactivate(credential)).await?;
        if !revoked {
            return Err(SessionError::NotFound);
        }

        tracing::info!(user_id = %claims.sub, "revoked session");
        Ok(())
    }

    pub async fn list_active_sessions(&self, user_id: Uuid) -> Result<Vec<AuthSession>, SessionError> {
        Ok(with_deadline(self.store_timeout, self.store.list_active(user_id)).await?)
    }
}
