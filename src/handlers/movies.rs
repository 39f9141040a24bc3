// handlers/movies.rs - /v1/movies

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue},
};
use serde::Deserialize;

use crate::database::models::movie::validate_movie;
use crate::database::models::{Movie, Runtime};
use crate::error::ApiError;
use crate::handlers::JsonBody;
use crate::middleware::{ApiResult, Envelope};
use crate::state::AppState;
use crate::validator::Validator;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MovieInput {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub year: i32,
    #[serde(default)]
    pub runtime: Runtime,
    #[serde(default)]
    pub genres: Vec<String>,
}

/// Ids that don't parse or aren't positive are simply not found.
fn read_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>()
        .ok()
        .filter(|id| *id >= 1)
        .ok_or(ApiError::NotFound)
}

pub async fn create_movie(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<MovieInput>,
) -> ApiResult {
    let mut movie = Movie::new(input.title, input.year, input.runtime, input.genres);

    let mut v = Validator::new();
    validate_movie(&mut v, &movie);
    if !v.valid() {
        return Err(ApiError::failed_validation(v.into_errors()));
    }

    state.movies.insert(&mut movie).await?;

    let location = HeaderValue::from_str(&format!("/v1/movies/{}", movie.id))
        .map_err(ApiError::server_error)?;

    Ok(Envelope::new("movie", &movie)
        .created()
        .with_header(header::LOCATION, location))
}

pub async fn show_movie(State(state): State<AppState>, Path(raw_id): Path<String>) -> ApiResult {
    let id = read_id(&raw_id)?;
    let movie = state.movies.get(id).await?;
    Ok(Envelope::new("movie", &movie))
}

pub async fn delete_movie(State(state): State<AppState>, Path(raw_id): Path<String>) -> ApiResult {
    let id = read_id(&raw_id)?;
    state.movies.delete(id).await?;
    Ok(Envelope::new("message", "movie successfully deleted"))
}
