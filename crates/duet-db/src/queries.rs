use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, params, params_from_iter};
use uuid::Uuid;

use duet_types::cursor::Cursor;
use duet_types::models::{ChatRoom, Message, MessageType, format_timestamp, now};

use crate::Database;
use crate::models::{MESSAGE_COLUMNS, MessageRow, ROOM_COLUMNS, RoomRow};
use crate::store::{ChatStore, MessageQuery};

impl ChatStore for Database {
    // -- Messages --

    fn append_message(&self, message: &Message) -> Result<()> {
        self.with_conn_mut(|conn| insert_message(conn, message))
    }

    fn find_message(&self, id: Uuid) -> Result<Option<Message>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                    [id.to_string()],
                    MessageRow::from_row,
                )
                .optional()?;
            row.map(Message::try_from).transpose()
        })
    }

    fn find_messages(&self, ids: &[Uuid]) -> Result<Vec<Message>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id IN ({}) ORDER BY sent_at, id",
                placeholders(1, ids.len())
            );
            let ids: Vec<String> = ids.iter().map(Uuid::to_string).collect();
            collect_messages(conn, &sql, params_from_iter(ids.iter()))
        })
    }

    fn query_messages(&self, query: &MessageQuery) -> Result<Vec<Message>> {
        if matches!(&query.types, Some(types) if types.is_empty()) {
            return Ok(vec![]);
        }
        self.with_conn(|conn| select_timeline(conn, query))
    }

    // -- Read state --

    fn mark_room_read(&self, room_id: Uuid, receiver_id: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET read = 1
                 WHERE room_id = ?1 AND receiver_id = ?2 AND read = 0 AND message_type = ?3",
                params![room_id.to_string(), receiver_id, MessageType::Chat.code()],
            )?;
            Ok(changed)
        })
    }

    fn mark_messages_read(&self, room_id: Uuid, receiver_id: &str, ids: &[Uuid]) -> Result<Vec<Message>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;

            let mut values: Vec<Value> = vec![
                Value::Text(room_id.to_string()),
                Value::Text(receiver_id.to_string()),
                Value::Text(MessageType::Chat.code().to_string()),
            ];
            values.extend(ids.iter().map(|id| Value::Text(id.to_string())));

            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE room_id = ?1 AND receiver_id = ?2 AND read = 0 AND message_type = ?3
                   AND id IN ({})
                 ORDER BY sent_at, id",
                placeholders(4, ids.len())
            );
            let mut flipped = collect_messages(&tx, &sql, params_from_iter(values.iter()))?;

            if !flipped.is_empty() {
                let sql = format!(
                    "UPDATE messages SET read = 1 WHERE id IN ({})",
                    placeholders(1, flipped.len())
                );
                let flipped_ids: Vec<String> = flipped.iter().map(|m| m.id.to_string()).collect();
                tx.execute(&sql, params_from_iter(flipped_ids.iter()))?;
            }
            tx.commit()?;

            for message in &mut flipped {
                message.read = true;
            }
            Ok(flipped)
        })
    }

    fn unread_counts(&self, receiver_id: &str) -> Result<HashMap<Uuid, u64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT room_id, COUNT(*) FROM messages
                 WHERE receiver_id = ?1 AND read = 0 AND message_type = ?2
                 GROUP BY room_id",
            )?;
            let rows = stmt
                .query_map(params![receiver_id, MessageType::Chat.code()], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut counts = HashMap::with_capacity(rows.len());
            for (room_id, count) in rows {
                counts.insert(room_id.parse::<Uuid>()?, count as u64);
            }
            Ok(counts)
        })
    }

    // -- Rooms --

    fn upsert_room(&self, participant_a: &str, participant_b: &str) -> Result<(ChatRoom, bool)> {
        let (low, high) = if participant_a <= participant_b {
            (participant_a, participant_b)
        } else {
            (participant_b, participant_a)
        };

        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO chat_rooms
                    (id, participant_a, participant_b, pair_low, pair_high, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    Uuid::new_v4().to_string(),
                    participant_a,
                    participant_b,
                    low,
                    high,
                    format_timestamp(&now()),
                ],
            )?;

            let row = conn.query_row(
                &format!("SELECT {ROOM_COLUMNS} FROM chat_rooms WHERE pair_low = ?1 AND pair_high = ?2"),
                params![low, high],
                RoomRow::from_row,
            )?;
            Ok((ChatRoom::try_from(row)?, inserted == 1))
        })
    }

    fn find_room(&self, id: Uuid) -> Result<Option<ChatRoom>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {ROOM_COLUMNS} FROM chat_rooms WHERE id = ?1"),
                    [id.to_string()],
                    RoomRow::from_row,
                )
                .optional()?;
            row.map(ChatRoom::try_from).transpose()
        })
    }

    fn update_last_message(&self, room_id: Uuid, content: &str, at: DateTime<Utc>) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE chat_rooms SET last_message_content = ?2, last_message_time = ?3
                 WHERE id = ?1 AND (last_message_time IS NULL OR last_message_time <= ?3)",
                params![room_id.to_string(), content, format_timestamp(&at)],
            )?;
            Ok(())
        })
    }

    fn rooms_for_user(&self, user_id: &str, before: Option<Cursor>, limit: usize) -> Result<Vec<ChatRoom>> {
        self.with_conn(|conn| select_rooms_for_user(conn, user_id, before, limit))
    }
}

fn insert_message(conn: &Connection, message: &Message) -> Result<()> {
    let payload = message
        .event_payload
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    conn.execute(
        "INSERT INTO messages
            (id, room_id, sender_id, receiver_id, content, sent_at, read, message_type, event_payload)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            message.id.to_string(),
            message.room_id.to_string(),
            message.sender_id,
            message.receiver_id,
            message.content,
            format_timestamp(&message.sent_at),
            message.read,
            message.message_type.code(),
            payload,
        ],
    )?;
    Ok(())
}

fn select_timeline(conn: &Connection, query: &MessageQuery) -> Result<Vec<Message>> {
    let mut sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE room_id = ?1");
    let mut values: Vec<Value> = vec![Value::Text(query.room_id.to_string())];

    if let Some(cursor) = &query.before {
        push_cursor_clause(&mut sql, &mut values, "sent_at", cursor);
    }

    if let Some(types) = &query.types {
        let start = values.len() + 1;
        values.extend(types.iter().map(|t| Value::Text(t.code().to_string())));
        sql.push_str(&format!(
            " AND message_type IN ({})",
            placeholders(start, types.len())
        ));
    }

    values.push(Value::Integer(query.limit as i64));
    sql.push_str(&format!(" ORDER BY sent_at DESC, id DESC LIMIT ?{}", values.len()));

    collect_messages(conn, &sql, params_from_iter(values.iter()))
}

fn select_rooms_for_user(
    conn: &Connection,
    user_id: &str,
    before: Option<Cursor>,
    limit: usize,
) -> Result<Vec<ChatRoom>> {
    const ACTIVITY: &str = "COALESCE(last_message_time, created_at)";

    let mut sql = format!(
        "SELECT {ROOM_COLUMNS} FROM chat_rooms WHERE (participant_a = ?1 OR participant_b = ?1)"
    );
    let mut values: Vec<Value> = vec![Value::Text(user_id.to_string())];

    if let Some(cursor) = &before {
        push_cursor_clause(&mut sql, &mut values, ACTIVITY, cursor);
    }

    values.push(Value::Integer(limit as i64));
    sql.push_str(&format!(" ORDER BY {ACTIVITY} DESC, id DESC LIMIT ?{}", values.len()));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values.iter()), RoomRow::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter().map(ChatRoom::try_from).collect()
}

/// Appends "strictly before the cursor" in (time DESC, id DESC) order.
fn push_cursor_clause(sql: &mut String, values: &mut Vec<Value>, time_expr: &str, cursor: &Cursor) {
    values.push(Value::Text(format_timestamp(&cursor.at)));
    let at = values.len();

    match cursor.id {
        Some(id) => {
            values.push(Value::Text(id.to_string()));
            let id_idx = values.len();
            sql.push_str(&format!(
                " AND ({time_expr} < ?{at} OR ({time_expr} = ?{at} AND id < ?{id_idx}))"
            ));
        }
        None => sql.push_str(&format!(" AND {time_expr} < ?{at}")),
    }
}

fn collect_messages<P: rusqlite::Params>(conn: &Connection, sql: &str, params: P) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, MessageRow::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter().map(Message::try_from).collect()
}

/// `?start, ?start+1, ...` for `count` parameters.
fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
