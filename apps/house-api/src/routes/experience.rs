//! Experience award ingress for the forum's business services.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use house_common::ActionKind;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::middleware::AuthUser;
use crate::error::ApiError;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/v1/experience", post(award_experience))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AwardRequest {
    pub user_id: i64,
    #[schema(value_type = String, example = "post")]
    pub action: ActionKind,
    /// Defaults to the action's standard amount.
    pub exp_amount: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AwardResponse {
    pub user_id: i64,
    #[schema(value_type = String)]
    pub action: ActionKind,
    pub exp_amount: i64,
}

/// Queue an experience credit. The level update happens asynchronously.
#[utoipa::path(
    post,
    path = "/api/v1/experience",
    tag = "Experience",
    request_body = AwardRequest,
    security(("bearer" = [])),
    responses(
        (status = 202, description = "Event accepted by the broker", body = AwardResponse),
        (status = 400, description = "Non-positive amount", body = crate::error::ApiErrorBody),
        (status = 401, description = "Unauthorized", body = crate::error::ApiErrorBody),
        (status = 403, description = "Caller may not award experience", body = crate::error::ApiErrorBody),
        (status = 503, description = "Broker unavailable", body = crate::error::ApiErrorBody),
    )
)]
pub async fn award_experience(
    caller: AuthUser,
    State(state): State<AppState>,
    Json(body): Json<AwardRequest>,
) -> Result<(StatusCode, Json<AwardResponse>), ApiError> {
    if !caller.is_privileged() {
        return Err(ApiError::forbidden("Only forum services may award experience"));
    }

    let amount = body.exp_amount.unwrap_or_else(|| body.action.default_amount());
    state
        .publisher
        .publish(body.user_id, body.action, amount)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(AwardResponse {
            user_id: body.user_id,
            action: body.action,
            exp_amount: amount,
        }),
    ))
}
