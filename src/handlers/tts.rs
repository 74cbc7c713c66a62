use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};

use crate::errors::{AppError, Result};
use crate::handlers::AppState;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{GenerateRequest, JobStatusResponse, JobSubmission};
use crate::services::rate_limiter::RateLimiter;

pub async fn generate(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<JobSubmission>> {
    check_rate_limit(&state, &user.id).await?;

    let submission = state.tts_service().create_job(&user, request).await?;
    Ok(Json(submission))
}

/// Sync mode: raw audio bytes, no JSON envelope, no durable record.
pub async fn generate_sync(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Json(request): Json<GenerateRequest>,
) -> Result<Response> {
    check_rate_limit(&state, &user.id).await?;

    let content_type = request.format.content_type();
    let bytes = state.tts_service().generate_direct(&user, &request).await?;

    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

pub async fn status(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(job_id): Path<String>,
) -> Result<Json<JobStatusResponse>> {
    let response = state.tts_service().get_job_status(&job_id, &user.id).await?;
    Ok(Json(response))
}

async fn check_rate_limit(state: &AppState, user_id: &str) -> Result<()> {
    let allowed = RateLimiter::check_generate_limit(
        state.redis.as_ref(),
        user_id,
        state.config.rate_limit_requests,
        state.config.rate_limit_window_secs,
    )
    .await?;

    if !allowed {
        return Err(AppError::RateLimit);
    }
    Ok(())
}
