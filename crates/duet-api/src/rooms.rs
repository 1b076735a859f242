use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use duet_types::api::{Claims, CreateRoomRequest, RoomResponse};
use duet_types::cursor::Cursor;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RoomListQuery {
    pub cursor: Option<Cursor>,
    pub size: Option<usize>,
}

/// Create the room for the caller and `participant_id`, or return the
/// existing one. 201 when created, 200 otherwise.
pub async fn create_room(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateRoomRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let rooms = state.hub.rooms.clone();
    let (room, created) =
        tokio::task::spawn_blocking(move || rooms.create_or_get(&claims.sub, &req.participant_id)).await??;

    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    Ok((
        status,
        Json(RoomResponse {
            room_id: room.id,
            participant_a: room.participant_a,
            participant_b: room.participant_b,
            created,
        }),
    ))
}

pub async fn list_rooms(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<RoomListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let rooms = state.hub.rooms.clone();
    let page = tokio::task::spawn_blocking(move || rooms.list(&claims.sub, query.cursor, query.size)).await??;
    Ok(Json(page))
}

pub async fn room_status(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let rooms = state.hub.rooms.clone();
    let status = tokio::task::spawn_blocking(move || rooms.status(room_id, &claims.sub)).await??;
    Ok(Json(status))
}
