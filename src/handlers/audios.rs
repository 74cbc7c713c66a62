use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::database::queries::AudioQueries;
use crate::errors::{AppError, Result};
use crate::handlers::AppState;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{Audio, AudioListItem, AudioListResponse, PageQuery};

pub async fn list(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<AudioListResponse>> {
    let (page, page_size) = query.clamped();

    let audios =
        AudioQueries::list_for_user(state.database.pool(), &user.id, page_size, query.offset())
            .await?;
    let total = AudioQueries::count_for_user(state.database.pool(), &user.id).await?;

    Ok(Json(AudioListResponse {
        items: audios.into_iter().map(AudioListItem::from).collect(),
        total,
        page,
        page_size,
    }))
}

pub async fn get(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<Json<Audio>> {
    let audio = AudioQueries::find_for_user(state.database.pool(), &id, &user.id)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(Json(audio))
}

pub async fn remove(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let deleted = AudioQueries::soft_delete(state.database.pool(), &id, &user.id).await?;
    if !deleted {
        return Err(AppError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Proxy-streams cache-stored audio. Object-store artifacts have stable
/// URLs and never hit this route.
pub async fn stream(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response> {
    let (bytes, format) = state
        .storage
        .open_cached(&id)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(([(header::CONTENT_TYPE, format.content_type())], bytes).into_response())
}
