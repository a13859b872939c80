use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;
use sqlx::{PgExecutor, PgPool, query_as};
use utils::api::users::LoanApplicationResponse;
use uuid::Uuid;

use super::types::{ApplicationStatus, FieldError, check_len};
use crate::auth::HandshakePayload;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LoanApplication {
    pub id: Uuid,
    pub user_id: Uuid,
    pub loan_amount: Option<f64>,
    pub loan_term: Option<i32>,
    pub loan_purpose: Option<String>,
    pub monthly_income: Option<f64>,
    pub status: ApplicationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<LoanApplication> for LoanApplicationResponse {
    fn from(application: LoanApplication) -> Self {
        Self {
            id: application.id,
            loan_amount: application.loan_amount,
            loan_term: application.loan_term,
            loan_purpose: application.loan_purpose,
            monthly_income: application.monthly_income,
            status: application.status.as_str().to_string(),
            created_at: application.created_at,
            updated_at: application.updated_at,
        }
    }
}

pub const LOAN_PURPOSE_MAX_LEN: usize = 100;

/// Loan fields recognised in a handshake payload. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoanIntake {
    pub loan_amount: Option<f64>,
    pub loan_term: Option<i32>,
    pub loan_purpose: Option<String>,
    pub monthly_income: Option<f64>,
}

impl LoanIntake {
    /// Returns `None` when the payload carries no usable loan field. A malformed
    /// field is logged and skipped without dropping the others.
    pub fn from_payload(payload: &HandshakePayload) -> Option<Self> {
        let intake = Self {
            loan_amount: payload_field(payload, "loan_amount"),
            loan_term: payload_field(payload, "loan_term"),
            loan_purpose: payload_field(payload, "loan_purpose"),
            monthly_income: payload_field(payload, "monthly_income"),
        };
        (!intake.is_empty()).then_some(intake)
    }

    pub fn to_payload(&self) -> Option<HandshakePayload> {
        let mut payload = HandshakePayload::new();
        if let Some(amount) = self.loan_amount {
            payload.insert("loan_amount".into(), json!(amount));
        }
        if let Some(term) = self.loan_term {
            payload.insert("loan_term".into(), json!(term));
        }
        if let Some(purpose) = self.loan_purpose.as_ref() {
            payload.insert("loan_purpose".into(), json!(purpose));
        }
        if let Some(income) = self.monthly_income {
            payload.insert("monthly_income".into(), json!(income));
        }
        (!payload.is_empty()).then_some(payload)
    }

    pub fn is_empty(&self) -> bool {
        self.loan_amount.is_none()
            && self.loan_term.is_none()
            && self.loan_purpose.is_none()
            && self.monthly_income.is_none()
    }

    /// Rejects values the `loan_applications` columns cannot hold.
    pub fn validate(&self) -> Result<(), FieldError> {
        check_len(
            "loan_purpose",
            self.loan_purpose.as_deref(),
            LOAN_PURPOSE_MAX_LEN,
        )?;
        check_positive("loan_amount", self.loan_amount)?;
        check_positive("monthly_income", self.monthly_income)?;
        if matches!(self.loan_term, Some(term) if term <= 0) {
            return Err(FieldError::NotPositive("loan_term"));
        }
        Ok(())
    }
}

fn check_positive(field: &'static str, value: Option<f64>) -> Result<(), FieldError> {
    match value {
        Some(value) if !value.is_finite() || value <= 0.0 => Err(FieldError::NotPositive(field)),
        _ => Ok(()),
    }
}

fn payload_field<T>(payload: &HandshakePayload, key: &'static str) -> Option<T>
where
    T: DeserializeOwned,
{
    let value = payload.get(key).filter(|value| !value.is_null())?;
    match serde_json::from_value(value.clone()) {
        Ok(parsed) => Some(parsed),
        Err(error) => {
            tracing::warn!(field = key, %error, "ignoring malformed loan field");
            None
        }
    }
}

const APPLICATION_COLUMNS: &str = r#"
    id,
    user_id,
    loan_amount,
    loan_term,
    loan_purpose,
    monthly_income,
    status,
    created_at,
    updated_at
"#;

pub struct LoanApplicationRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> LoanApplicationRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<LoanApplication>, sqlx::Error> {
        query_as::<_, LoanApplication>(&format!(
            r#"
            SELECT {APPLICATION_COLUMNS}
            FROM loan_applications
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(self.pool)
        .await
    }

    pub async fn get_for_user(
        &self,
        user_id: Uuid,
        application_id: Uuid,
    ) -> Result<Option<LoanApplication>, sqlx::Error> {
        query_as::<_, LoanApplication>(&format!(
            r#"
            SELECT {APPLICATION_COLUMNS}
            FROM loan_applications
            WHERE id = $1
              AND user_id = $2
            "#
        ))
        .bind(application_id)
        .bind(user_id)
        .fetch_optional(self.pool)
        .await
    }

    pub async fn create(
        &self,
        user_id: Uuid,
        intake: &LoanIntake,
    ) -> Result<LoanApplication, sqlx::Error> {
        create_pending(self.pool, user_id, intake).await
    }
}

pub(crate) async fn create_pending<'e, E>(
    executor: E,
    user_id: Uuid,
    intake: &LoanIntake,
) -> Result<LoanApplication, sqlx::Error>
where
    E: PgExecutor<'e>,
{
    query_as::<_, LoanApplication>(&format!(
        r#"
        INSERT INTO loan_applications (
            user_id,
            loan_amount,
            loan_term,
            loan_purpose,
            monthly_income,
            status
        )
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {APPLICATION_COLUMNS}
        "#
    ))
    .bind(user_id)
    .bind(intake.loan_amount)
    .bind(intake.loan_term)
    .bind(intake.loan_purpose.as_deref())
    .bind(intake.monthly_income)
    .bind(ApplicationStatus::Pending)
    .fetch_one(executor)
    .await
}
