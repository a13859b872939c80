use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, query_as};
use utils::api::users::UserProfile;
use uuid::Uuid;

use super::{
    Tx,
    applications::{self, LoanApplication, LoanApplicationRepository, LoanIntake},
    types::{FieldError, check_len},
};
use crate::auth::{ExternalIdentity, HandshakePayload, StoreError, UserDirectory};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub telegram_id: i64,
    pub phone_number: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            telegram_id: self.telegram_id,
            phone_number: self.phone_number.clone(),
            username: self.username.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

pub const PHONE_MAX_LEN: usize = 20;
pub const NAME_MAX_LEN: usize = 100;

/// Rejects identity fields the `users` columns cannot hold.
pub fn validate_identity(identity: &ExternalIdentity) -> Result<(), FieldError> {
    if identity.phone.trim().is_empty() {
        return Err(FieldError::Empty("phone"));
    }
    check_len("phone", Some(&identity.phone), PHONE_MAX_LEN)?;
    check_len("first_name", identity.first_name.as_deref(), NAME_MAX_LEN)?;
    check_len("last_name", identity.last_name.as_deref(), NAME_MAX_LEN)?;
    check_len("username", identity.username.as_deref(), NAME_MAX_LEN)
}

const USER_COLUMNS: &str = r#"
    id,
    telegram_id,
    phone_number,
    username,
    first_name,
    last_name,
    created_at,
    updated_at
"#;

pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn fetch_user(&self, user_id: Uuid) -> Result<Option<User>, sqlx::Error> {
        query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE id = $1
            "#
        ))
        .bind(user_id)
        .fetch_optional(self.pool)
        .await
    }

    pub async fn fetch_by_telegram_id(&self, telegram_id: i64) -> Result<Option<User>, sqlx::Error> {
        query_as::<_, User>(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE telegram_id = $1
            "#
        ))
        .bind(telegram_id)
        .fetch_optional(self.pool)
        .await
    }
}

/// Single-statement upsert; concurrent binds for the same telegram id converge
/// on one row.
async fn upsert_by_telegram_id(
    tx: &mut Tx<'_>,
    identity: &ExternalIdentity,
) -> Result<User, sqlx::Error> {
    query_as::<_, User>(&format!(
        r#"
        INSERT INTO users (telegram_id, phone_number, first_name, last_name, username)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (telegram_id) DO UPDATE
        SET phone_number = EXCLUDED.phone_number,
            first_name   = COALESCE(EXCLUDED.first_name, users.first_name),
            last_name    = COALESCE(EXCLUDED.last_name, users.last_name),
            username     = COALESCE(EXCLUDED.username, users.username),
            updated_at   = NOW()
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(identity.telegram_id)
    .bind(identity.phone.as_str())
    .bind(identity.first_name.as_deref())
    .bind(identity.last_name.as_deref())
    .bind(identity.username.as_deref())
    .fetch_one(&mut **tx)
    .await
}

/// Postgres-backed [`UserDirectory`].
#[derive(Clone)]
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn find_or_create(
        &self,
        identity: &ExternalIdentity,
        payload: Option<&HandshakePayload>,
    ) -> Result<User, StoreError> {
        let mut tx = self.pool.begin().await?;

        let user = upsert_by_telegram_id(&mut tx, identity).await?;

        if let Some(intake) = payload.and_then(LoanIntake::from_payload) {
            let application = applications::create_pending(&mut *tx, user.id, &intake).await?;
            tracing::info!(
                user_id = %user.id,
                application_id = %application.id,
                "recorded loan application from handshake"
            );
        }

        tx.commit().await?;
        Ok(user)
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(UserRepository::new(&self.pool).fetch_user(user_id).await?)
    }

    async fn find_by_telegram_id(&self, telegram_id: i64) -> Result<Option<User>, StoreError> {
        Ok(UserRepository::new(&self.pool)
            .fetch_by_telegram_id(telegram_id)
            .await?)
    }

    async fn list_applications(&self, user_id: Uuid) -> Result<Vec<LoanApplication>, StoreError> {
        Ok(LoanApplicationRepository::new(&self.pool)
            .list_by_user(user_id)
            .await?)
    }

    async fn find_application(
        &self,
        user_id: Uuid,
        application_id: Uuid,
    ) -> Result<Option<LoanApplication>, StoreError> {
        Ok(LoanApplicationRepository::new(&self.pool)
            .get_for_user(user_id, application_id)
            .await?)
    }

    async fn create_application(
        &self,
        user_id: Uuid,
        intake: &LoanIntake,
    ) -> Result<LoanApplication, StoreError> {
        Ok(LoanApplicationRepository::new(&self.pool)
            .create(user_id, intake)
            .await?)
    }
}
