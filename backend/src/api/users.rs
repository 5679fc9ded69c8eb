use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::info;

use crate::api::error::ApiError;
use crate::api::server::AppState;
use crate::db::models::User;

/// Query pairs in arrival order. Repeated keys are allowed, the first one wins.
pub type QueryPairs = Vec<(String, String)>;

fn first_param<'a>(params: &'a [(String, String)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

// A missing id reaches storage as "" and fails there.
fn id_param(params: &[(String, String)]) -> &str {
    first_param(params, "id").unwrap_or_default()
}

fn parse_param(params: &[(String, String)], name: &'static str) -> Result<u32, ApiError> {
    let value = first_param(params, name).unwrap_or_default();
    value.parse().map_err(|_| ApiError::Query {
        name,
        value: value.to_string(),
    })
}

fn decode_user(body: Result<Bytes, BytesRejection>) -> Result<User, ApiError> {
    Ok(serde_json::from_slice(&body?)?)
}

pub async fn create_user(
    State(state): State<Arc<AppState>>,
    body: Result<Bytes, BytesRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let mut user = decode_user(body)?;
    user.id = state.ids.new_id();

    let user = state
        .store
        .create(user)
        .await
        .map_err(ApiError::store("creating", StatusCode::BAD_REQUEST))?;
    info!(id = %user.id, "created user");

    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryPairs>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<User>, ApiError> {
    let patch = decode_user(body)?;

    let user = state
        .store
        .update(id_param(&params), patch)
        .await
        .map_err(ApiError::store("updating", StatusCode::BAD_REQUEST))?;

    Ok(Json(user))
}

pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryPairs>,
) -> Result<&'static str, ApiError> {
    state
        .store
        .delete(id_param(&params))
        .await
        .map_err(ApiError::store("deleting", StatusCode::BAD_REQUEST))?;
    info!(id = id_param(&params), "deleted user");

    Ok("Deleted User")
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryPairs>,
) -> Result<Json<User>, ApiError> {
    let user = state
        .store
        .get(id_param(&params))
        .await
        .map_err(ApiError::store("getting", StatusCode::INTERNAL_SERVER_ERROR))?;

    Ok(Json(user))
}

pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryPairs>,
) -> Result<Json<Vec<User>>, ApiError> {
    let page = parse_param(&params, "page")?;
    let limit = parse_param(&params, "limit")?;

    let users = state
        .store
        .list(page, limit)
        .await
        .map_err(ApiError::store("getting all", StatusCode::INTERNAL_SERVER_ERROR))?;

    Ok(Json(users))
}
