use anyhow::Result;
use rusqlite::{Connection, Row};
use uuid::Uuid;

use messup_types::models::User;

use super::{OptionalExt, get_ts, get_uuid, ts};
use crate::models::UserRow;
use crate::{Database, now};

#[derive(Debug)]
pub enum NewUserOutcome {
    Created(User),
    UsernameTaken,
    EmailTaken,
}

impl Database {
    /// Insert a user unless the username or email is already registered.
    /// The uniqueness checks and the insert happen under one lock.
    pub fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<NewUserOutcome> {
        self.with_conn(|conn| {
            if query_user(conn, "username", username)?.is_some() {
                return Ok(NewUserOutcome::UsernameTaken);
            }
            if query_user(conn, "email", email)?.is_some() {
                return Ok(NewUserOutcome::EmailTaken);
            }

            let user = User {
                id: Uuid::new_v4(),
                username: username.to_string(),
                email: email.to_string(),
                created_at: now(),
            };
            conn.execute(
                "INSERT INTO users (id, username, email, password, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                (
                    user.id.to_string(),
                    &user.username,
                    &user.email,
                    password_hash,
                    ts(&user.created_at),
                ),
            )?;
            Ok(NewUserOutcome::Created(user))
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: Uuid) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", &id.to_string()))
    }

    /// Batch lookup preserving the order of `ids`; unknown ids are skipped.
    pub fn get_users_by_ids(&self, ids: &[Uuid]) -> Result<Vec<User>> {
        self.with_conn(|conn| {
            let mut users = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(row) = query_user(conn, "id", &id.to_string())? {
                    users.push(row.into_user());
                }
            }
            Ok(users)
        })
    }
}

pub(crate) fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, username, email, password, created_at FROM users WHERE {} = ?1",
        column
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let row = stmt.query_row([value], row_to_user).optional()?;
    Ok(row)
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: get_uuid(row, 0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        created_at: get_ts(row, 4)?,
    })
}
