use anyhow::Result;
use rusqlite::{Connection, Row, params};
use uuid::Uuid;

use messup_types::models::{MediaType, MessageStatus, PrivateMessage};

use super::{OptionalExt, get_enum, get_ts, get_uuid, ts};
use crate::{Database, now};

const MESSAGE_COLUMNS: &str =
    "id, sender_id, receiver_id, content, media_ref, media_type, status, created_at";

impl Database {
    /// Persist a new private message with status SENT and a server timestamp.
    pub fn insert_private_message(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        content: &str,
        media_ref: Option<&str>,
        media_type: MediaType,
    ) -> Result<PrivateMessage> {
        let message = PrivateMessage {
            id: Uuid::new_v4(),
            sender_id,
            receiver_id,
            content: content.to_string(),
            media_ref: media_ref.map(str::to_string),
            media_type,
            status: MessageStatus::Sent,
            timestamp: now(),
        };

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO private_messages
                     (id, sender_id, receiver_id, content, media_ref, media_type, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    message.id.to_string(),
                    sender_id.to_string(),
                    receiver_id.to_string(),
                    &message.content,
                    &message.media_ref,
                    message.media_type.as_str(),
                    message.status.as_str(),
                    ts(&message.timestamp),
                ],
            )?;
            Ok(())
        })?;

        Ok(message)
    }

    pub fn get_private_message(&self, id: Uuid) -> Result<Option<PrivateMessage>> {
        self.with_conn(|conn| query_message(conn, id))
    }

    /// SENT -> DELIVERED. Returns false if the message was not at SENT, so a
    /// READ message is never moved back.
    pub fn mark_delivered(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE private_messages SET status = ?1 WHERE id = ?2 AND status = ?3",
                params![
                    MessageStatus::Delivered.as_str(),
                    id.to_string(),
                    MessageStatus::Sent.as_str(),
                ],
            )?;
            Ok(updated > 0)
        })
    }

    /// Move a message to READ from whatever state it is in and return the
    /// updated row, or `None` if no such message exists.
    pub fn mark_read(&self, id: Uuid) -> Result<Option<PrivateMessage>> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE private_messages SET status = ?1 WHERE id = ?2",
                params![MessageStatus::Read.as_str(), id.to_string()],
            )?;
            if updated == 0 {
                return Ok(None);
            }
            query_message(conn, id)
        })
    }

    /// Full transcript between two users in either direction, oldest first.
    pub fn get_conversation(&self, a: Uuid, b: Uuid) -> Result<Vec<PrivateMessage>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM private_messages
                 WHERE (sender_id = ?1 AND receiver_id = ?2) OR (sender_id = ?2 AND receiver_id = ?1)
                 ORDER BY created_at ASC, rowid ASC",
                MESSAGE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![a.to_string(), b.to_string()], row_to_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Most recent message exchanged between two users, if any.
    pub fn get_latest_between(&self, a: Uuid, b: Uuid) -> Result<Option<PrivateMessage>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM private_messages
                 WHERE (sender_id = ?1 AND receiver_id = ?2) OR (sender_id = ?2 AND receiver_id = ?1)
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT 1",
                MESSAGE_COLUMNS
            );
            let row = conn
                .query_row(&sql, params![a.to_string(), b.to_string()], row_to_message)
                .optional()?;
            Ok(row)
        })
    }
}

fn query_message(conn: &Connection, id: Uuid) -> Result<Option<PrivateMessage>> {
    let sql = format!("SELECT {} FROM private_messages WHERE id = ?1", MESSAGE_COLUMNS);
    let row = conn
        .query_row(&sql, [id.to_string()], row_to_message)
        .optional()?;
    Ok(row)
}

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<PrivateMessage> {
    Ok(PrivateMessage {
        id: get_uuid(row, 0)?,
        sender_id: get_uuid(row, 1)?,
        receiver_id: get_uuid(row, 2)?,
        content: row.get(3)?,
        media_ref: row.get(4)?,
        media_type: get_enum(row, 5)?,
        status: get_enum(row, 6)?,
        timestamp: get_ts(row, 7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::users::NewUserOutcome;

    fn user(db: &Database, name: &str) -> Uuid {
        match db
            .create_user(name, &format!("{}@example.com", name), "hash")
            .unwrap()
        {
            NewUserOutcome::Created(user) => user.id,
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn insert_and_fetch_conversation() {
        let db = Database::open_in_memory().unwrap();
        let (a, b, c) = (user(&db, "alice"), user(&db, "bob"), user(&db, "carol"));

        let first = db.insert_private_message(a, b, "hi", None, MediaType::Text).unwrap();
        let second = db
            .insert_private_message(b, a, "", Some("http://cdn/x"), MediaType::Image)
            .unwrap();
        db.insert_private_message(a, c, "elsewhere", None, MediaType::Text).unwrap();

        let history = db.get_conversation(b, a).unwrap();
        assert_eq!(history, vec![first, second.clone()]);
        assert_eq!(db.get_latest_between(a, b).unwrap(), Some(second));
        assert_eq!(db.get_latest_between(b, c).unwrap(), None);
    }

    #[test]
    fn status_never_regresses() {
        let db = Database::open_in_memory().unwrap();
        let (a, b) = (user(&db, "alice"), user(&db, "bob"));
        let message = db.insert_private_message(a, b, "hi", None, MediaType::Text).unwrap();

        assert!(db.mark_delivered(message.id).unwrap());
        assert!(!db.mark_delivered(message.id).unwrap());

        let read = db.mark_read(message.id).unwrap().unwrap();
        assert_eq!(read.status, MessageStatus::Read);
        assert!(!db.mark_delivered(message.id).unwrap());
        assert_eq!(
            db.get_private_message(message.id).unwrap().unwrap().status,
            MessageStatus::Read
        );

        // Reading twice is harmless
        assert_eq!(
            db.mark_read(message.id).unwrap().unwrap().status,
            MessageStatus::Read
        );
    }

    #[test]
    fn mark_read_unknown_message() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.mark_read(Uuid::new_v4()).unwrap().is_none());
    }
}
