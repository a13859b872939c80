use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use tracing::warn;

use crate::{
    AppState, configure_user_scope,
    db::{sessions::AuthSession, users::User},
    routes::error::session_error_response,
};

/// Attached to request extensions for every route behind [`require_session`].
#[derive(Clone)]
pub struct SessionContext {
    pub user: User,
    pub session: AuthSession,
    pub credential: String,
}

pub async fn require_session(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let credential = match req.headers().typed_get::<Authorization<Bearer>>() {
        Some(Authorization(bearer)) => bearer.token().to_owned(),
        None => {
            return session_error_response(&super::SessionError::MalformedCredential)
                .into_response();
        }
    };

    let validated = match state.sessions().validate_session(&credential).await {
        Ok(validated) => validated,
        Err(error) => {
            warn!(%error, "rejected session credential");
            return session_error_response(&error).into_response();
        }
    };

    configure_user_scope(validated.user.id, validated.user.username.as_deref());

    req.extensions_mut().insert(SessionContext {
        user: validated.user,
        session: validated.session,
        credential,
    });

    next.run(req).await
}
