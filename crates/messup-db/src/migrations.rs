use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            email       TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS friend_requests (
            id          TEXT PRIMARY KEY,
            sender_id   TEXT NOT NULL REFERENCES users(id),
            receiver_id TEXT NOT NULL REFERENCES users(id),
            status      TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            CHECK (sender_id <> receiver_id)
        );

        -- At most one pending request per unordered pair
        CREATE UNIQUE INDEX IF NOT EXISTS idx_friend_requests_pending_pair
            ON friend_requests(min(sender_id, receiver_id), max(sender_id, receiver_id))
            WHERE status = 'PENDING';

        CREATE INDEX IF NOT EXISTS idx_friend_requests_receiver
            ON friend_requests(receiver_id, status);

        CREATE TABLE IF NOT EXISTS friendships (
            id          TEXT PRIMARY KEY,
            user1_id    TEXT NOT NULL REFERENCES users(id),
            user2_id    TEXT NOT NULL REFERENCES users(id),
            created_at  TEXT NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_friendships_pair
            ON friendships(min(user1_id, user2_id), max(user1_id, user2_id));

        CREATE TABLE IF NOT EXISTS chat_groups (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL CHECK (name <> ''),
            created_by  TEXT NOT NULL REFERENCES users(id),
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS group_members (
            group_id    TEXT NOT NULL REFERENCES chat_groups(id),
            user_id     TEXT NOT NULL REFERENCES users(id),
            is_admin    INTEGER NOT NULL DEFAULT 0,
            joined_at   TEXT NOT NULL,
            PRIMARY KEY (group_id, user_id)
        );

        CREATE INDEX IF NOT EXISTS idx_group_members_user
            ON group_members(user_id);

        CREATE TABLE IF NOT EXISTS group_messages (
            id          TEXT PRIMARY KEY,
            group_id    TEXT NOT NULL REFERENCES chat_groups(id),
            sender_id   TEXT REFERENCES users(id),
            content     TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_group_messages_group
            ON group_messages(group_id, created_at);

        CREATE TABLE IF NOT EXISTS private_messages (
            id          TEXT PRIMARY KEY,
            sender_id   TEXT NOT NULL REFERENCES users(id),
            receiver_id TEXT NOT NULL REFERENCES users(id),
            content     TEXT NOT NULL,
            media_ref   TEXT,
            media_type  TEXT NOT NULL,
            status      TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_private_messages_pair
            ON private_messages(sender_id, receiver_id, created_at);

        CREATE TABLE IF NOT EXISTS notifications (
            id           TEXT PRIMARY KEY,
            recipient_id TEXT NOT NULL REFERENCES users(id),
            kind         TEXT NOT NULL,
            content      TEXT NOT NULL,
            reference_id TEXT,
            metadata     TEXT,
            is_read      INTEGER NOT NULL DEFAULT 0,
            created_at   TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_recipient
            ON notifications(recipient_id, is_read);

        -- Opaque client key material, never parsed server-side
        CREATE TABLE IF NOT EXISTS key_blobs (
            user_id     TEXT NOT NULL REFERENCES users(id),
            slot        TEXT NOT NULL,
            blob        BLOB NOT NULL,
            updated_at  TEXT NOT NULL,
            PRIMARY KEY (user_id, slot)
        );
        ",
    )?;

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

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 9);
    }
}
