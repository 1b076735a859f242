use std::sync::Arc;

use duet_gateway::ChatHub;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub hub: ChatHub,
    pub jwt_secret: String,
}

impl AppStateInner {
    pub fn new(hub: ChatHub, jwt_secret: impl Into<String>) -> AppState {
        Arc::new(Self {
            hub,
            jwt_secret: jwt_secret.into(),
        })
    }
}
