use axum::{
    Json, Router,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use utils::api::users::{CreateApplicationRequest, LoanApplicationResponse};
use uuid::Uuid;

use super::error::{ErrorResponse, field_error_response, handoff_error_response};
use crate::{AppState, auth::SessionContext, db::applications::LoanIntake};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/applications",
            get(list_applications).post(create_application),
        )
        .route("/applications/{application_id}", get(get_application))
}

pub async fn create_application(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    Json(request): Json<CreateApplicationRequest>,
) -> Response {
    let intake = LoanIntake {
        loan_amount: Some(request.loan_amount),
        loan_term: Some(request.loan_term),
        loan_purpose: Some(request.loan_purpose),
        monthly_income: Some(request.monthly_income),
    };
    if let Err(error) = intake.validate() {
        return field_error_response(&error).into_response();
    }

    match state
        .handoff()
        .submit_application(ctx.user.id, &intake)
        .await
    {
        Ok(application) => Json(LoanApplicationResponse::from(application)).into_response(),
        Err(error) => handoff_error_response(&error).into_response(),
    }
}

pub async fn list_applications(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
) -> Response {
    match state.handoff().list_applications(ctx.user.id).await {
        Ok(applications) => Json(
            applications
                .into_iter()
                .map(LoanApplicationResponse::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(error) => handoff_error_response(&error).into_response(),
    }
}

pub async fn get_application(
    State(state): State<AppState>,
    Extension(ctx): Extension<SessionContext>,
    Path(application_id): Path<Uuid>,
) -> Response {
    match state
        .handoff()
        .find_application(ctx.user.id, application_id)
        .await
    {
        Ok(Some(application)) => Json(LoanApplicationResponse::from(application)).into_response(),
        Ok(None) => ErrorResponse::new(
            StatusCode::NOT_FOUND,
            "application_not_found",
            "Application not found",
        )
        .into_response(),
        Err(error) => handoff_error_response(&error).into_response(),
    }
}
