use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (rooms + timeline)");
        conn.execute_batch(
            "
            -- pair_low/pair_high hold the participants sorted, so (A,B) and
            -- (B,A) collide on the unique index.
            CREATE TABLE chat_rooms (
                id                      TEXT PRIMARY KEY,
                participant_a           TEXT NOT NULL,
                participant_b           TEXT NOT NULL,
                pair_low                TEXT NOT NULL,
                pair_high               TEXT NOT NULL,
                last_message_content    TEXT,
                last_message_time       TEXT,
                created_at              TEXT NOT NULL,
                UNIQUE(pair_low, pair_high)
            );

            CREATE INDEX idx_rooms_participant_a ON chat_rooms(participant_a);
            CREATE INDEX idx_rooms_participant_b ON chat_rooms(participant_b);

            CREATE TABLE messages (
                id              TEXT PRIMARY KEY,
                room_id         TEXT NOT NULL REFERENCES chat_rooms(id),
                sender_id       TEXT,
                receiver_id     TEXT,
                content         TEXT NOT NULL,
                sent_at         TEXT NOT NULL,
                read            INTEGER NOT NULL DEFAULT 0,
                message_type    TEXT NOT NULL,
                event_payload   TEXT
            );

            CREATE INDEX idx_messages_room_time
                ON messages(room_id, sent_at, id);

            CREATE INDEX idx_messages_unread
                ON messages(receiver_id, read, room_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run(&conn).unwrap();
        run(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, 1);
    }
}
