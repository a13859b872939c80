use std::{future::Future, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::token_store::{ExternalIdentity, HandshakePayload};
use crate::db::{
    applications::{LoanApplication, LoanIntake},
    sessions::AuthSession,
    users::User,
};

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum StoreError {
    /// Timeout or connection-level failure. The only retryable store outcome.
    #[error("durable store unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StoreError::Unavailable(error.to_string())
            }
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) => StoreError::Unavailable(error.to_string()),
            other => StoreError::Database(other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewSession<'a> {
    pub user_id: Uuid,
    pub token: &'a str,
    pub user_agent: Option<&'a str>,
    pub device_info: Option<&'a str>,
    pub ip_address: Option<&'a str>,
    pub expires_at: DateTime<Utc>,
}

/// Durable session rows. Each call must be atomic on its own.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: NewSession<'_>) -> Result<AuthSession, StoreError>;

    async fn find_active(&self, token: &str) -> Result<Option<AuthSession>, StoreError>;

    /// Flips an active row to inactive. Returns `false` when no active row matched.
    async fn deactivate(&self, token: &str) -> Result<bool, StoreError>;

    /// Active rows for the user, newest first.
    async fn list_active(&self, user_id: Uuid) -> Result<Vec<AuthSession>, StoreError>;
}

/// Durable users and the loan applications captured during login.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Atomic find-or-create keyed by telegram id. Optional identity fields that
    /// are absent leave existing values untouched. Loan fields in `payload` are
    /// recorded as a new pending application.
    async fn find_or_create(
        &self,
        identity: &ExternalIdentity,
        payload: Option<&HandshakePayload>,
    ) -> Result<User, StoreError>;

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError>;

    async fn find_by_telegram_id(&self, telegram_id: i64) -> Result<Option<User>, StoreError>;

    async fn list_applications(&self, user_id: Uuid) -> Result<Vec<LoanApplication>, StoreError>;

    async fn find_application(
        &self,
        user_id: Uuid,
        application_id: Uuid,
    ) -> Result<Option<LoanApplication>, StoreError>;

    /// Records a new pending application for an existing user.
    async fn create_application(
        &self,
        user_id: Uuid,
        intake: &LoanIntake,
    ) -> Result<LoanApplication, StoreError>;
}

/// Bounds a single store round trip.
pub(crate) async fn with_deadline<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Unavailable(format!(
            "store call exceeded {}ms",
            limit.as_millis()
        ))),
    }
}
