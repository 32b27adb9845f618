use anyhow::Result;
use rusqlite::{Connection, Row, params};
use uuid::Uuid;

use messup_types::models::{Group, GroupMember, GroupMessage};

use super::{OptionalExt, get_opt_uuid, get_ts, get_uuid, ts};
use crate::{Database, now};

const GROUP_COLUMNS: &str = "g.id, g.name, g.created_by, g.created_at";

impl Database {
    /// Create a group, its memberships and the system message announcing it,
    /// all in one transaction. `members` pairs each user id with its admin flag.
    pub fn create_group(
        &self,
        name: &str,
        created_by: Uuid,
        members: &[(Uuid, bool)],
        system_message: &str,
    ) -> Result<(Group, GroupMessage)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let group = Group {
                id: Uuid::new_v4(),
                name: name.to_string(),
                created_by,
                created_at: now(),
            };
            tx.execute(
                "INSERT INTO chat_groups (id, name, created_by, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    group.id.to_string(),
                    &group.name,
                    created_by.to_string(),
                    ts(&group.created_at),
                ],
            )?;

            for (user_id, is_admin) in members {
                insert_member(&tx, group.id, *user_id, *is_admin, &group.created_at)?;
            }

            let message = GroupMessage {
                id: Uuid::new_v4(),
                group_id: group.id,
                sender_id: None,
                sender_username: None,
                content: system_message.to_string(),
                timestamp: group.created_at,
            };
            insert_message(&tx, &message)?;

            tx.commit()?;
            Ok((group, message))
        })
    }

    pub fn get_group(&self, id: Uuid) -> Result<Option<Group>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM chat_groups g WHERE g.id = ?1", GROUP_COLUMNS);
            let row = conn
                .query_row(&sql, [id.to_string()], row_to_group)
                .optional()?;
            Ok(row)
        })
    }

    /// Insert a non-admin membership. Returns `None` if the user already
    /// belongs to the group.
    pub fn add_group_member(&self, group_id: Uuid, user_id: Uuid) -> Result<Option<GroupMember>> {
        self.with_conn(|conn| {
            let joined_at = now();
            if !insert_member(conn, group_id, user_id, false, &joined_at)? {
                return Ok(None);
            }
            query_member(conn, group_id, user_id)
        })
    }

    pub fn get_group_member(&self, group_id: Uuid, user_id: Uuid) -> Result<Option<GroupMember>> {
        self.with_conn(|conn| query_member(conn, group_id, user_id))
    }

    pub fn is_group_member(&self, group_id: Uuid, user_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM group_members WHERE group_id = ?1 AND user_id = ?2)",
                params![group_id.to_string(), user_id.to_string()],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    pub fn get_groups_of_user(&self, user_id: Uuid) -> Result<Vec<Group>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM chat_groups g
                 JOIN group_members m ON m.group_id = g.id
                 WHERE m.user_id = ?1
                 ORDER BY g.created_at ASC, g.rowid ASC",
                GROUP_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id.to_string()], row_to_group)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_group_members(&self, group_id: Uuid) -> Result<Vec<GroupMember>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.group_id, m.user_id, u.username, m.is_admin, m.joined_at
                 FROM group_members m
                 JOIN users u ON u.id = m.user_id
                 WHERE m.group_id = ?1
                 ORDER BY m.joined_at ASC, m.rowid ASC",
            )?;
            let rows = stmt
                .query_map([group_id.to_string()], row_to_member)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn insert_group_message(
        &self,
        group_id: Uuid,
        sender_id: Uuid,
        content: &str,
    ) -> Result<GroupMessage> {
        self.with_conn(|conn| {
            let sender_username: String = conn.query_row(
                "SELECT username FROM users WHERE id = ?1",
                [sender_id.to_string()],
                |row| row.get(0),
            )?;
            let message = GroupMessage {
                id: Uuid::new_v4(),
                group_id,
                sender_id: Some(sender_id),
                sender_username: Some(sender_username),
                content: content.to_string(),
                timestamp: now(),
            };
            insert_message(conn, &message)?;
            Ok(message)
        })
    }

    /// Full history of a group, oldest first.
    pub fn get_group_messages(&self, group_id: Uuid) -> Result<Vec<GroupMessage>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.id, m.group_id, m.sender_id, u.username, m.content, m.created_at
                 FROM group_messages m
                 LEFT JOIN users u ON u.id = m.sender_id
                 WHERE m.group_id = ?1
                 ORDER BY m.created_at ASC, m.rowid ASC",
            )?;
            let rows = stmt
                .query_map([group_id.to_string()], |row| {
                    Ok(GroupMessage {
                        id: get_uuid(row, 0)?,
                        group_id: get_uuid(row, 1)?,
                        sender_id: get_opt_uuid(row, 2)?,
                        sender_username: row.get(3)?,
                        content: row.get(4)?,
                        timestamp: get_ts(row, 5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

/// Returns false when the membership already exists.
fn insert_member(
    conn: &Connection,
    group_id: Uuid,
    user_id: Uuid,
    is_admin: bool,
    joined_at: &chrono::DateTime<chrono::Utc>,
) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO group_members (group_id, user_id, is_admin, joined_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![group_id.to_string(), user_id.to_string(), is_admin, ts(joined_at)],
    )?;
    Ok(inserted > 0)
}

fn insert_message(conn: &Connection, message: &GroupMessage) -> Result<()> {
    conn.execute(
        "INSERT INTO group_messages (id, group_id, sender_id, content, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            message.id.to_string(),
            message.group_id.to_string(),
            message.sender_id.map(|id| id.to_string()),
            &message.content,
            ts(&message.timestamp),
        ],
    )?;
    Ok(())
}

fn query_member(conn: &Connection, group_id: Uuid, user_id: Uuid) -> Result<Option<GroupMember>> {
    let row = conn
        .query_row(
            "SELECT m.group_id, m.user_id, u.username, m.is_admin, m.joined_at
             FROM group_members m
             JOIN users u ON u.id = m.user_id
             WHERE m.group_id = ?1 AND m.user_id = ?2",
            params![group_id.to_string(), user_id.to_string()],
            row_to_member,
        )
        .optional()?;
    Ok(row)
}

fn row_to_group(row: &Row<'_>) -> rusqlite::Result<Group> {
    Ok(Group {
        id: get_uuid(row, 0)?,
        name: row.get(1)?,
        created_by: get_uuid(row, 2)?,
        created_at: get_ts(row, 3)?,
    })
}

fn row_to_member(row: &Row<'_>) -> rusqlite::Result<GroupMember> {
    Ok(GroupMember {
        group_id: get_uuid(row, 0)?,
        user_id: get_uuid(row, 1)?,
        username: row.get(2)?,
        is_admin: row.get(3)?,
        joined_at: get_ts(row, 4)?,
    })
}
