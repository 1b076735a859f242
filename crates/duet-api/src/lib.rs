pub mod error;
pub mod messages;
pub mod middleware;
pub mod rooms;
pub mod state;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

pub use error::ApiError;
pub use state::{AppState, AppStateInner};

/// Every REST route, behind bearer authentication.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/rooms", post(rooms::create_room).get(rooms::list_rooms))
        .route("/rooms/{room_id}", get(rooms::room_status))
        .route(
            "/rooms/{room_id}/messages",
            get(messages::get_messages).post(messages::send_message),
        )
        .route("/rooms/{room_id}/messages/read", post(messages::mark_messages_read))
        .route("/rooms/{room_id}/read", post(messages::mark_room_read))
        .route("/unread", get(messages::unread_counts))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ))
        .with_state(state)
}
