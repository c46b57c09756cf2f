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
        info!("Running migration v1 (conversations + messages)");
        conn.execute_batch(
            "
            CREATE TABLE conversations (
                id              TEXT PRIMARY KEY,
                participant_a   TEXT NOT NULL,
                participant_b   TEXT NOT NULL,
                created_at      TEXT NOT NULL,
                last_message    TEXT NOT NULL DEFAULT '',
                last_message_at TEXT NOT NULL,
                CHECK (participant_a <> participant_b)
            );

            CREATE INDEX idx_conversations_a ON conversations(participant_a);
            CREATE INDEX idx_conversations_b ON conversations(participant_b);

            CREATE TABLE messages (
                id              TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL REFERENCES conversations(id),
                sender_id       TEXT NOT NULL,
                receiver_id     TEXT NOT NULL,
                kind            TEXT NOT NULL,
                content         TEXT,
                media_url       TEXT,
                status          TEXT NOT NULL DEFAULT 'delivered',
                created_at      TEXT NOT NULL,
                delivered_at    TEXT,
                sent_at         TEXT,
                seen_at         TEXT,
                CHECK ((kind = 'text') = (content IS NOT NULL)),
                CHECK ((kind = 'text') = (media_url IS NULL))
            );

            CREATE INDEX idx_messages_conversation
                ON messages(conversation_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
