use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use utils::api::{
    auth::{
        AuthTokenRequest, AuthTokenResponse, BotAuthCompleteRequest, BotAuthCompleteResponse,
        BotHealthResponse,
    },
    users::BotUserResponse,
};

use super::{
    auth::start_handshake,
    error::{ErrorResponse, field_error_response, handoff_error_response},
};
use crate::{AppState, auth::ExternalIdentity, db::users::validate_identity};

pub(crate) const BOT_TOKEN_HEADER: &str = "x-bot-token";

/// Routes called by the Telegram bot process. Every one of them sits behind
/// [`require_bot_key`].
pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/bot/auth/init", post(init_auth))
        .route("/bot/auth/complete", post(complete_auth))
        .route("/bot/users/{telegram_id}", get(get_user))
        .route("/bot/health", get(health))
        .layer(middleware::from_fn_with_state(state, require_bot_key))
}

async fn require_bot_key(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let presented = req
        .headers()
        .get(BOT_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());

    if let Err(error) = state.handoff().authorize_bridge(presented) {
        return handoff_error_response(&error).into_response();
    }

    next.run(req).await
}

pub async fn init_auth(
    State(state): State<AppState>,
    Json(request): Json<AuthTokenRequest>,
) -> Result<Json<AuthTokenResponse>, ErrorResponse> {
    start_handshake(&state, &request).map(Json)
}

pub async fn complete_auth(
    State(state): State<AppState>,
    Json(request): Json<BotAuthCompleteRequest>,
) -> Response {
    let identity = ExternalIdentity {
        telegram_id: request.telegram_id,
        phone: request.phone,
        first_name: request.first_name,
        last_name: request.last_name,
        username: request.username,
    };
    if let Err(error) = validate_identity(&identity) {
        return field_error_response(&error).into_response();
    }

    match state
        .handoff()
        .complete_from_external_channel(&request.auth_token, identity)
        .await
    {
        Ok(bootstrap) => (
            StatusCode::OK,
            Json(BotAuthCompleteResponse {
                success: true,
                frontend_return_url: bootstrap.return_url,
                user_id: bootstrap.user.id,
            }),
        )
            .into_response(),
        Err(error) => handoff_error_response(&error).into_response(),
    }
}

pub async fn get_user(State(state): State<AppState>, Path(telegram_id): Path<i64>) -> Response {
    match state.handoff().lookup_telegram_user(telegram_id).await {
        Ok((user, applications)) => Json(BotUserResponse {
            user: user.profile(),
            applications: applications.into_iter().map(Into::into).collect(),
        })
        .into_response(),
        Err(error) => handoff_error_response(&error).into_response(),
    }
}

pub async fn health() -> Json<BotHealthResponse> {
    Json(BotHealthResponse {
        status: "ok".to_string(),
        service: "bot-api".to_string(),
    })
}
