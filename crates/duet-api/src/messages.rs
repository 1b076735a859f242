use std::str::FromStr;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use duet_db::pagination::HistoryRequest;
use duet_types::api::{
    Claims, MarkReadRequest, MarkReadResponse, SendMessageRequest, SendMessageResponse,
    UnreadCountsResponse,
};
use duet_types::cursor::Cursor;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Position of the last item of the previous page.
    pub cursor: Option<Cursor>,
    pub size: Option<usize>,
    /// Comma-separated type codes, e.g. `CHAT,USER_JOINED`.
    pub types: Option<String>,
    /// Comma-separated categories, e.g. `user_action,notice`.
    pub categories: Option<String>,
    pub include_system_events: Option<bool>,
}

impl HistoryQuery {
    fn into_request(self) -> Result<HistoryRequest, ApiError> {
        Ok(HistoryRequest {
            cursor: self.cursor,
            size: self.size,
            types: parse_list(self.types.as_deref())?,
            categories: parse_list(self.categories.as_deref())?,
            include_system_events: self.include_system_events,
        })
    }
}

fn parse_list<T>(raw: Option<&str>) -> Result<Vec<T>, ApiError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<T>().map_err(|e| ApiError::BadRequest(e.to_string())))
        .collect()
}

pub async fn get_messages(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let request = query.into_request()?;
    let rooms = state.hub.rooms.clone();
    let page = tokio::task::spawn_blocking(move || rooms.history(room_id, &claims.sub, &request)).await??;
    Ok(Json(page))
}

pub async fn send_message(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let router = state.hub.router.clone();
    let delivery =
        tokio::task::spawn_blocking(move || router.send(room_id, &claims.sub, &req.content)).await??;

    Ok((
        StatusCode::CREATED,
        Json(SendMessageResponse {
            message: delivery.message,
            outcome: delivery.outcome,
        }),
    ))
}

pub async fn mark_messages_read(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<MarkReadRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let receipts = state.hub.receipts.clone();
    let flipped =
        tokio::task::spawn_blocking(move || receipts.mark_read(room_id, &claims.sub, &req.message_ids)).await??;

    debug!("Marked {} message(s) read in room {}", flipped.len(), room_id);
    Ok(Json(MarkReadResponse {
        updated: flipped.len(),
    }))
}

pub async fn mark_room_read(
    State(state): State<AppState>,
    Path(room_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let receipts = state.hub.receipts.clone();
    let updated = tokio::task::spawn_blocking(move || receipts.mark_all_read(room_id, &claims.sub)).await??;
    Ok(Json(MarkReadResponse { updated }))
}

pub async fn unread_counts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let rooms = state.hub.rooms.clone();
    let counts = tokio::task::spawn_blocking(move || rooms.unread_counts(&claims.sub)).await??;
    Ok(Json(UnreadCountsResponse { counts }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use duet_types::models::{EventCategory, MessageType};

    #[test]
    fn comma_lists_parse() {
        let types: Vec<MessageType> = parse_list(Some("CHAT, USER_JOINED,")).unwrap();
        assert_eq!(types, vec![MessageType::Chat, MessageType::UserJoined]);

        let categories: Vec<EventCategory> = parse_list(Some("notice")).unwrap();
        assert_eq!(categories, vec![EventCategory::Notice]);

        assert!(parse_list::<MessageType>(None).unwrap().is_empty());
        assert!(matches!(
            parse_list::<MessageType>(Some("ROOM_DELETED")),
            Err(ApiError::BadRequest(_))
        ));
    }
}
