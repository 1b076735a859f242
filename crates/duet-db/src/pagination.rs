//! Cursor pagination over room timelines and room lists.
//!
//! Pages are fetched newest first with one extra row: if the store returns
//! more than the page size, the extra row is dropped and `has_next` is set.
//! There is no separate count query. The next cursor is the position of the
//! last item returned, so rows inserted while a client is paging (always
//! newer than anything already served) never shift later pages.

use anyhow::Result;
use uuid::Uuid;

use duet_types::api::Page;
use duet_types::cursor::Cursor;
use duet_types::models::{ChatRoom, EventCategory, Message, MessageType};

use crate::store::{ChatStore, MessageQuery};

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy)]
pub struct PageLimits {
    pub default_size: usize,
    pub max_size: usize,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_size: DEFAULT_PAGE_SIZE,
            max_size: MAX_PAGE_SIZE,
        }
    }
}

impl PageLimits {
    pub fn clamp(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_size)
            .clamp(1, self.max_size.max(1))
    }
}

/// History filters for one page of a room timeline.
#[derive(Debug, Clone, Default)]
pub struct HistoryRequest {
    pub cursor: Option<Cursor>,
    pub size: Option<usize>,
    /// Restrict to these types when non-empty.
    pub types: Vec<MessageType>,
    /// Restrict to types in these categories when non-empty; intersects `types`.
    pub categories: Vec<EventCategory>,
    /// `Some(false)` means chat only, whatever `types` says.
    pub include_system_events: Option<bool>,
}

impl HistoryRequest {
    /// The type restriction handed to the store. `None` means unrestricted.
    pub fn type_restriction(&self) -> Option<Vec<MessageType>> {
        if self.include_system_events == Some(false) {
            return Some(vec![MessageType::Chat]);
        }

        let mut allowed: Option<Vec<MessageType>> = None;
        if !self.types.is_empty() {
            let mut types = self.types.clone();
            types.sort_by_key(|t| t.code());
            types.dedup();
            allowed = Some(types);
        }

        if !self.categories.is_empty() {
            let by_category: Vec<MessageType> = MessageType::ALL
                .into_iter()
                .filter(|t| self.categories.contains(&t.category()))
                .collect();
            allowed = Some(match allowed {
                Some(types) => types.into_iter().filter(|t| by_category.contains(t)).collect(),
                None => by_category,
            });
        }

        allowed
    }
}

/// One page of a room's timeline, newest first.
pub fn page_messages(
    store: &dyn ChatStore,
    room_id: Uuid,
    request: &HistoryRequest,
    limits: &PageLimits,
) -> Result<Page<Message>> {
    let size = limits.clamp(request.size);

    let rows = store.query_messages(&MessageQuery {
        room_id,
        before: request.cursor,
        types: request.type_restriction(),
        limit: size + 1,
    })?;

    Ok(into_page(rows, size, |m| Cursor::new(m.sent_at, m.id)))
}

/// One page of the rooms a user participates in, most recent activity first.
///
/// The cursor is the room's activity time, which moves forward when a
/// message arrives. A room that becomes active while a client is walking
/// the list jumps ahead of the cursor: the rest of that walk skips it and
/// the next walk from the first page shows it at the top.
pub fn page_rooms(
    store: &dyn ChatStore,
    user_id: &str,
    cursor: Option<Cursor>,
    size: Option<usize>,
    limits: &PageLimits,
) -> Result<Page<ChatRoom>> {
    let size = limits.clamp(size);
    let rows = store.rooms_for_user(user_id, cursor, size + 1)?;
    Ok(into_page(rows, size, |r| Cursor::new(r.activity_at(), r.id)))
}

fn into_page<T>(mut items: Vec<T>, size: usize, cursor_of: impl Fn(&T) -> Cursor) -> Page<T> {
    let has_next = items.len() > size;
    if has_next {
        items.truncate(size);
    }
    let next_cursor = if has_next { items.last().map(cursor_of) } else { None };

    Page {
        items,
        has_next,
        next_cursor,
    }
}
