use anyhow::Result;
use rusqlite::{Row, params};
use uuid::Uuid;

use messup_types::models::{Notification, NotificationType};

use super::{get_enum, get_opt_uuid, get_ts, get_uuid, ts};
use crate::{Database, now};

impl Database {
    pub fn insert_notification(
        &self,
        recipient_id: Uuid,
        kind: NotificationType,
        content: &str,
        reference_id: Option<Uuid>,
        metadata: Option<serde_json::Value>,
    ) -> Result<Notification> {
        let notification = Notification {
            id: Uuid::new_v4(),
            recipient_id,
            kind,
            content: content.to_string(),
            reference_id,
            metadata,
            is_read: false,
            created_at: now(),
        };
        let metadata_json = notification
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications
                     (id, recipient_id, kind, content, reference_id, metadata, is_read, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
                params![
                    notification.id.to_string(),
                    recipient_id.to_string(),
                    kind.as_str(),
                    &notification.content,
                    reference_id.map(|id| id.to_string()),
                    metadata_json,
                    ts(&notification.created_at),
                ],
            )?;
            Ok(())
        })?;

        Ok(notification)
    }

    /// Notifications for a recipient, newest first.
    pub fn get_notifications(&self, recipient_id: Uuid, unread_only: bool) -> Result<Vec<Notification>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, recipient_id, kind, content, reference_id, metadata, is_read, created_at
                 FROM notifications
                 WHERE recipient_id = ?1 AND (?2 = 0 OR is_read = 0)
                 ORDER BY created_at DESC, rowid DESC",
            )?;
            let rows = stmt
                .query_map(params![recipient_id.to_string(), unread_only], row_to_notification)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Flip `is_read` on a notification owned by `recipient_id`. Returns
    /// false if no such notification exists for that recipient.
    pub fn mark_notification_read(&self, id: Uuid, recipient_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND recipient_id = ?2",
                params![id.to_string(), recipient_id.to_string()],
            )?;
            Ok(updated > 0)
        })
    }
}

fn row_to_notification(row: &Row<'_>) -> rusqlite::Result<Notification> {
    let metadata: Option<String> = row.get(5)?;
    let metadata = metadata
        .map(|raw| serde_json::from_str(&raw))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Notification {
        id: get_uuid(row, 0)?,
        recipient_id: get_uuid(row, 1)?,
        kind: get_enum::<NotificationType>(row, 2)?,
        content: row.get(3)?,
        reference_id: get_opt_uuid(row, 4)?,
        metadata,
        is_read: row.get(6)?,
        created_at: get_ts(row, 7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::users::NewUserOutcome;

    #[test]
    fn unread_filter_and_mark_read() {
        let db = Database::open_in_memory().unwrap();
        let alice = match db.create_user("alice", "alice@example.com", "hash").unwrap() {
            NewUserOutcome::Created(user) => user.id,
            other => panic!("unexpected outcome: {:?}", other),
        };

        let first = db
            .insert_notification(
                alice,
                NotificationType::FriendRequest,
                "bob has sent you a friend request.",
                Some(Uuid::new_v4()),
                Some(serde_json::json!({ "senderId": "x" })),
            )
            .unwrap();
        let second = db
            .insert_notification(alice, NotificationType::Other, "hello", None, None)
            .unwrap();

        let all = db.get_notifications(alice, false).unwrap();
        assert_eq!(all, vec![second.clone(), first.clone()]);

        assert!(db.mark_notification_read(first.id, alice).unwrap());
        let unread = db.get_notifications(alice, true).unwrap();
        assert_eq!(unread, vec![second]);

        // Marking again succeeds and stays read
        assert!(db.mark_notification_read(first.id, alice).unwrap());
        assert!(!db.mark_notification_read(first.id, Uuid::new_v4()).unwrap());
        assert!(!db.mark_notification_read(Uuid::new_v4(), alice).unwrap());
    }
}
