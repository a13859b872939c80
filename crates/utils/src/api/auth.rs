use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use super::users::{SessionInfo, UserProfile};
use crate::device::DeviceInfo;

/// Pre-auth form submitted by the browser when it starts a Telegram login.
#[derive(Debug, Serialize, Deserialize, Clone, Default, TS)]
#[ts(export)]
pub struct AuthTokenRequest {
    #[serde(default)]
    pub loan_amount: Option<f64>,
    #[serde(default)]
    pub loan_term: Option<i32>,
    #[serde(default)]
    pub loan_purpose: Option<String>,
    #[serde(default)]
    pub monthly_income: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize, Clone, TS)]
#[ts(export)]
pub struct AuthTokenResponse {
    pub auth_token: String,
    pub telegram_url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, TS)]
#[ts(export)]
pub struct VerifyTokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub user: UserProfile,
    pub session: SessionInfo,
    pub device_info: DeviceInfo,
}

#[derive(Debug, Serialize, Deserialize, Clone, TS)]
#[ts(export)]
pub struct LogoutResponse {
    pub message: String,
}

/// Sent by the bot once the user has shared their own contact.
#[derive(Debug, Serialize, Deserialize, Clone, TS)]
#[ts(export)]
pub struct BotAuthCompleteRequest {
    pub auth_token: String,
    pub telegram_id: i64,
    pub phone: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, TS)]
#[ts(export)]
pub struct BotAuthCompleteResponse {
    pub success: bool,
    pub frontend_return_url: String,
    pub user_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize, Clone, TS)]
pub struct BotHealthResponse {
    pub status: String,
    pub service: String,
}
