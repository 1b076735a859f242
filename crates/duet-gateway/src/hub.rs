use std::sync::Arc;

use duet_db::pagination::PageLimits;
use duet_db::ChatStore;

use crate::dispatcher::Transport;
use crate::journal::EventJournal;
use crate::presence::Presence;
use crate::receipts::ReadReceipts;
use crate::registry::ConnectionRegistry;
use crate::rooms::Rooms;
use crate::router::DeliveryRouter;

/// Everything the gateway and the HTTP layer need, wired over one store,
/// one registry and one transport. Cheap to clone.
#[derive(Clone)]
pub struct ChatHub {
    pub registry: ConnectionRegistry,
    pub journal: EventJournal,
    pub presence: Presence,
    pub router: DeliveryRouter,
    pub receipts: ReadReceipts,
    pub rooms: Rooms,
}

impl ChatHub {
    pub fn new(store: Arc<dyn ChatStore>, transport: Arc<dyn Transport>, limits: PageLimits) -> Self {
        let registry = ConnectionRegistry::new();
        let journal = EventJournal::new(store.clone());

        Self {
            presence: Presence::new(registry.clone(), journal.clone(), transport.clone()),
            router: DeliveryRouter::new(store.clone(), registry.clone(), journal.clone(), transport.clone()),
            receipts: ReadReceipts::new(store.clone(), journal.clone(), transport),
            rooms: Rooms::new(store, registry.clone(), journal.clone(), limits),
            registry,
            journal,
        }
    }
}
