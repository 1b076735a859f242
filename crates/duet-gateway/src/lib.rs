pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod hub;
pub mod journal;
pub mod presence;
pub mod receipts;
pub mod registry;
pub mod rooms;
pub mod router;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{ChatError, Result};
pub use hub::ChatHub;
