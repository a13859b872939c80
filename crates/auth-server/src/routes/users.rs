use axum::{
    Json, Router,
    extract::{Extension, State},
    response::{IntoResponse, Response},
    routing::get,
};
use utils::{
    api::users::{CurrentSessionInfo, DeviceInfoResponse, SessionsResponse, UserProfile},
    device::DeviceInfo,
};

use super::{client::ClientInfo, error::session_error_response};
use crate::{AppState, auth::SessionContext};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/me", get(me))
        .route("/users/me/sessions", get(sessions))
        .route("/users/me/device-info", get(device_info))
}

pub async fn me(Extension(ctx): Extension<SessionContext>) -> Json<UserProfile> {
    Json(ctx.user.profile())
}

pub async fn sessions(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
) -> Response {
    match state.sessions().list_active_sessions(ctx.user.id).await {
        Ok(sessions) => {
            let sessions: Vec<_> = sessions.iter().map(|session| session.info()).collect();
            Json(SessionsResponse {
                user: ctx.user.profile(),
                total_sessions: sessions.len(),
                sessions,
            })
            .into_response()
        }
        Err(error) => session_error_response(&error).into_response(),
    }
}

/// Describes the client making this request, not the one that signed in.
pub async fn device_info(
    Extension(ctx): Extension<SessionContext>,
    client: ClientInfo,
) -> Json<DeviceInfoResponse> {
    Json(DeviceInfoResponse {
        user: ctx.user.profile(),
        current_session: CurrentSessionInfo {
            device_info: DeviceInfo::from_user_agent(client.user_agent.as_deref().unwrap_or("")),
            ip_address: client.ip_address,
        },
    })
}
