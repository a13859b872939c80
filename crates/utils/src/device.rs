use serde::{Deserialize, Serialize};
use ts_rs::TS;

const UNKNOWN: &str = "Unknown";

/// Coarse client description derived from a `User-Agent` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DeviceInfo {
    pub user_agent: String,
    pub browser: String,
    pub os: String,
    pub device: String,
}

impl DeviceInfo {
    pub fn from_user_agent(user_agent: &str) -> Self {
        let lower = user_agent.to_lowercase();

        // Order matters: Chrome and Edge UAs both mention "safari".
        let browser = if lower.contains("chrome") {
            "Chrome"
        } else if lower.contains("firefox") {
            "Firefox"
        } else if lower.contains("safari") {
            "Safari"
        } else if lower.contains("edge") {
            "Edge"
        } else {
            UNKNOWN
        };

        let os = if lower.contains("windows") {
            "Windows"
        } else if lower.contains("mac") {
            "macOS"
        } else if lower.contains("linux") {
            "Linux"
        } else if lower.contains("android") {
            "Android"
        } else if lower.contains("ios") {
            "iOS"
        } else {
            UNKNOWN
        };

        let device = if lower.contains("mobile") || lower.contains("android") {
            "Mobile"
        } else if lower.contains("tablet") || lower.contains("ipad") {
            "Tablet"
        } else {
            "Desktop"
        };

        Self {
            user_agent: user_agent.to_string(),
            browser: browser.to_string(),
            os: os.to_string(),
            device: device.to_string(),
        }
    }

    /// JSON form stored on the session row.
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}
