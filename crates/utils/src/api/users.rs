use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::device::DeviceInfo;

#[derive(Debug, Serialize, Deserialize, Clone, TS)]
#[ts(export)]
pub struct UserProfile {
    pub id: Uuid,
    pub telegram_id: i64,
    pub phone_number: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, TS)]
#[ts(export)]
pub struct SessionInfo {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub device_info: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, TS)]
#[ts(export)]
pub struct SessionsResponse {
    pub user: UserProfile,
    pub sessions: Vec<SessionInfo>,
    pub total_sessions: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, TS)]
#[ts(export)]
pub struct CurrentSessionInfo {
    pub ip_address: String,
    pub device_info: DeviceInfo,
}

#[derive(Debug, Serialize, Deserialize, Clone, TS)]
#[ts(export)]
pub struct DeviceInfoResponse {
    pub user: UserProfile,
    pub current_session: CurrentSessionInfo,
}

#[derive(Debug, Serialize, Deserialize, Clone, TS)]
#[ts(export)]
pub struct LoanApplicationResponse {
    pub id: Uuid,
    pub loan_amount: Option<f64>,
    pub loan_term: Option<i32>,
    pub loan_purpose: Option<String>,
    pub monthly_income: Option<f64>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of an explicit application filed by a signed-in user.
#[derive(Debug, Serialize, Deserialize, Clone, TS)]
#[ts(export)]
pub struct CreateApplicationRequest {
    pub loan_amount: f64,
    pub loan_term: i32,
    pub loan_purpose: String,
    pub monthly_income: f64,
}

/// User as seen by the bot, with every application newest first.
#[derive(Debug, Serialize, Deserialize, Clone, TS)]
#[ts(export)]
pub struct BotUserResponse {
    #[serde(flatten)]
    pub user: UserProfile,
    pub applications: Vec<LoanApplicationResponse>,
}
