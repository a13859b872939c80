use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use utils::api::auth::{AuthTokenRequest, AuthTokenResponse, LogoutResponse, VerifyTokenResponse};

use super::{
    client::ClientInfo,
    error::{ErrorResponse, field_error_response, handoff_error_response, session_error_response},
};
use crate::{AppState, auth::SessionError, db::applications::LoanIntake};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/telegram", post(create_auth_token))
        .route("/auth/verify/{token}", get(verify_auth_token))
        .route("/auth/logout", post(logout))
}

/// Loan fields the browser filled in before starting the login.
fn loan_intake(request: &AuthTokenRequest) -> LoanIntake {
    LoanIntake {
        loan_amount: request.loan_amount,
        loan_term: request.loan_term,
        loan_purpose: request.loan_purpose.clone(),
        monthly_income: request.monthly_income,
    }
}

/// Rejects the form up front: a value the store cannot hold would otherwise
/// fail every bot confirmation for this token.
pub(crate) fn start_handshake(
    state: &AppState,
    request: &AuthTokenRequest,
) -> Result<AuthTokenResponse, ErrorResponse> {
    let intake = loan_intake(request);
    intake
        .validate()
        .map_err(|error| field_error_response(&error))?;

    let init = state.handoff().request_handshake(intake.to_payload());
    Ok(AuthTokenResponse {
        auth_token: init.token,
        telegram_url: init.external_channel_target,
    })
}

pub async fn create_auth_token(
    State(state): State<AppState>,
    Json(request): Json<AuthTokenRequest>,
) -> Result<Json<AuthTokenResponse>, ErrorResponse> {
    start_handshake(&state, &request).map(Json)
}

pub async fn verify_auth_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
    client: ClientInfo,
) -> Response {
    match state
        .handoff()
        .exchange_token(&token, client.request_context())
        .await
    {
        Ok(outcome) => (
            StatusCode::OK,
            Json(VerifyTokenResponse {
                access_token: outcome.credential,
                token_type: "bearer".to_string(),
                user: outcome.user.profile(),
                session: outcome.session.info(),
                device_info: outcome.device_info,
            }),
        )
            .into_response(),
        Err(error) => handoff_error_response(&error).into_response(),
    }
}

/// Not behind the session middleware: an already closed session answers 404
/// rather than 401.
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(Authorization(bearer)) = headers.typed_get::<Authorization<Bearer>>() else {
        return session_error_response(&SessionError::MalformedCredential).into_response();
    };

    match state.handoff().logout(bearer.token()).await {
        Ok(()) => Json(LogoutResponse {
            message: "Successfully logged out".to_string(),
        })
        .into_response(),
        Err(error) => handoff_error_response(&error).into_response(),
    }
}
