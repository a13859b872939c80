use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, query_as};
use utils::api::users::SessionInfo;
use uuid::Uuid;

use crate::auth::{NewSession, SessionStore, StoreError};

/// One authenticated browser context. `token` is the issued credential itself.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct AuthSession {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub token: String,
    pub user_id: Uuid,
    pub user_agent: Option<String>,
    pub device_info: Option<String>,
    pub ip_address: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AuthSession {
    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            created_at: self.created_at,
            expires_at: self.expires_at,
            ip_address: self.ip_address.clone(),
            user_agent: self.user_agent.clone(),
            device_info: self.device_info.clone(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

const SESSION_COLUMNS: &str = r#"
    id,
    token,
    user_id,
    user_agent,
    device_info,
    ip_address,
    is_active,
    created_at,
    expires_at
"#;

pub struct AuthSessionRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> AuthSessionRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, session: &NewSession<'_>) -> Result<AuthSession, sqlx::Error> {
        query_as::<_, AuthSession>(&format!(
            r#"
            INSERT INTO auth_sessions (
                token,
                user_id,
                user_agent,
                device_info,
                ip_address,
                expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(session.token)
        .bind(session.user_id)
        .bind(session.user_agent)
        .bind(session.device_info)
        .bind(session.ip_address)
        .bind(session.expires_at)
        .fetch_one(self.pool)
        .await
    }

    pub async fn get_active_by_token(&self, token: &str) -> Result<Option<AuthSession>, sqlx::Error> {
        query_as::<_, AuthSession>(&format!(
            r#"
            SELECT {SESSION_COLUMNS}
            FROM auth_sessions
            WHERE token = $1
              AND is_active
            "#
        ))
        .bind(token)
        .fetch_optional(self.pool)
        .await
    }

    pub async fn deactivate(&self, token: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE auth_sessions
            SET is_active = FALSE
            WHERE token = $1
              AND is_active
            "#,
        )
        .bind(token)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn list_active(&self, user_id: Uuid) -> Result<Vec<AuthSession>, sqlx::Error> {
        query_as::<_, AuthSession>(&format!(
            r#"
            SELECT {SESSION_COLUMNS}
            FROM auth_sessions
            WHERE user_id = $1
              AND is_active
            ORDER BY created_at DESC, id DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(self.pool)
        .await
    }
}

/// Postgres-backed [`SessionStore`].
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn insert(&self, session: NewSession<'_>) -> Result<AuthSession, StoreError> {
        Ok(AuthSessionRepository::new(&self.pool)
            .create(&session)
            .await?)
    }

    async fn find_active(&self, token: &str) -> Result<Option<AuthSession>, StoreError> {
        Ok(AuthSessionRepository::new(&self.pool)
            .get_active_by_token(token)
            .await?)
    }

    async fn deactivate(&self, token: &str) -> Result<bool, StoreError> {
        Ok(AuthSessionRepository::new(&self.pool)
            .deactivate(token)
            .await?)
    }

    async fn list_active(&self, user_id: Uuid) -> Result<Vec<AuthSession>, StoreError> {
        Ok(AuthSessionRepository::new(&self.pool)
            .list_active(user_id)
            .await?)
    }
}
