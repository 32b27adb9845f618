use anyhow::Result;
use rusqlite::{Connection, Row, params};
use uuid::Uuid;

use messup_types::models::{FriendRequest, Friendship, RequestStatus};

use super::{OptionalExt, get_enum, get_ts, get_uuid, ts};
use crate::{Database, now};

const REQUEST_COLUMNS: &str = "id, sender_id, receiver_id, status, created_at";
const FRIENDSHIP_COLUMNS: &str = "id, user1_id, user2_id, created_at";

#[derive(Debug)]
pub enum NewRequestOutcome {
    Created(FriendRequest),
    AlreadyFriends,
    /// A pending request exists in either direction.
    AlreadyPending(FriendRequest),
}

#[derive(Debug)]
pub enum AcceptOutcome {
    Accepted(Friendship),
    NotFound,
    /// The request was already resolved; nothing was written.
    NotPending(RequestStatus),
}

impl Database {
    /// Create a pending request from `sender` to `receiver` unless the pair
    /// are already friends or a pending request exists either way round.
    pub fn create_friend_request(&self, sender: Uuid, receiver: Uuid) -> Result<NewRequestOutcome> {
        self.with_conn(|conn| {
            if query_friendship(conn, sender, receiver)?.is_some() {
                return Ok(NewRequestOutcome::AlreadyFriends);
            }
            if let Some(pending) = query_pending_between(conn, sender, receiver)? {
                return Ok(NewRequestOutcome::AlreadyPending(pending));
            }

            let request = FriendRequest {
                id: Uuid::new_v4(),
                sender_id: sender,
                receiver_id: receiver,
                status: RequestStatus::Pending,
                created_at: now(),
            };
            conn.execute(
                "INSERT INTO friend_requests (id, sender_id, receiver_id, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    request.id.to_string(),
                    sender.to_string(),
                    receiver.to_string(),
                    request.status.as_str(),
                    ts(&request.created_at),
                ],
            )?;
            Ok(NewRequestOutcome::Created(request))
        })
    }

    pub fn get_friend_request(&self, id: Uuid) -> Result<Option<FriendRequest>> {
        self.with_conn(|conn| query_request(conn, id))
    }

    /// PENDING -> ACCEPTED plus the friendship row, in one transaction.
    pub fn accept_friend_request(&self, id: Uuid) -> Result<AcceptOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(request) = query_request(&tx, id)? else {
                return Ok(AcceptOutcome::NotFound);
            };
            if request.status != RequestStatus::Pending {
                return Ok(AcceptOutcome::NotPending(request.status));
            }

            tx.execute(
                "UPDATE friend_requests SET status = ?1 WHERE id = ?2",
                params![RequestStatus::Accepted.as_str(), id.to_string()],
            )?;

            let friendship = Friendship {
                id: Uuid::new_v4(),
                user1_id: request.sender_id,
                user2_id: request.receiver_id,
                created_at: now(),
            };
            tx.execute(
                "INSERT INTO friendships (id, user1_id, user2_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    friendship.id.to_string(),
                    friendship.user1_id.to_string(),
                    friendship.user2_id.to_string(),
                    ts(&friendship.created_at),
                ],
            )?;

            tx.commit()?;
            Ok(AcceptOutcome::Accepted(friendship))
        })
    }

    /// PENDING -> REJECTED, then drop the row. Returns the request as it was
    /// before removal, or `None` if there was no pending request with that id.
    pub fn reject_friend_request(&self, id: Uuid) -> Result<Option<FriendRequest>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let updated = tx.execute(
                "UPDATE friend_requests SET status = ?1 WHERE id = ?2 AND status = ?3",
                params![
                    RequestStatus::Rejected.as_str(),
                    id.to_string(),
                    RequestStatus::Pending.as_str(),
                ],
            )?;
            if updated == 0 {
                return Ok(None);
            }
            let request = query_request(&tx, id)?;
            tx.execute("DELETE FROM friend_requests WHERE id = ?1", [id.to_string()])?;

            tx.commit()?;
            Ok(request)
        })
    }

    pub fn get_pending_between(&self, a: Uuid, b: Uuid) -> Result<Option<FriendRequest>> {
        self.with_conn(|conn| query_pending_between(conn, a, b))
    }

    /// Pending requests addressed to `user_id`, oldest first.
    pub fn get_incoming_requests(&self, user_id: Uuid) -> Result<Vec<FriendRequest>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM friend_requests
                 WHERE receiver_id = ?1 AND status = ?2
                 ORDER BY created_at ASC, rowid ASC",
                REQUEST_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(
                    params![user_id.to_string(), RequestStatus::Pending.as_str()],
                    row_to_request,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_friendship(&self, a: Uuid, b: Uuid) -> Result<Option<Friendship>> {
        self.with_conn(|conn| query_friendship(conn, a, b))
    }

    /// Every friendship edge touching `user_id`.
    pub fn get_friendships_of(&self, user_id: Uuid) -> Result<Vec<Friendship>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM friendships
                 WHERE user1_id = ?1 OR user2_id = ?1
                 ORDER BY created_at ASC, rowid ASC",
                FRIENDSHIP_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id.to_string()], row_to_friendship)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_request(conn: &Connection, id: Uuid) -> Result<Option<FriendRequest>> {
    let sql = format!("SELECT {} FROM friend_requests WHERE id = ?1", REQUEST_COLUMNS);
    let row = conn
        .query_row(&sql, [id.to_string()], row_to_request)
        .optional()?;
    Ok(row)
}

fn query_pending_between(conn: &Connection, a: Uuid, b: Uuid) -> Result<Option<FriendRequest>> {
    let sql = format!(
        "SELECT {} FROM friend_requests
         WHERE status = ?3
           AND ((sender_id = ?1 AND receiver_id = ?2) OR (sender_id = ?2 AND receiver_id = ?1))",
        REQUEST_COLUMNS
    );
    let row = conn
        .query_row(
            &sql,
            params![a.to_string(), b.to_string(), RequestStatus::Pending.as_str()],
            row_to_request,
        )
        .optional()?;
    Ok(row)
}

fn query_friendship(conn: &Connection, a: Uuid, b: Uuid) -> Result<Option<Friendship>> {
    let sql = format!(
        "SELECT {} FROM friendships
         WHERE (user1_id = ?1 AND user2_id = ?2) OR (user1_id = ?2 AND user2_id = ?1)",
        FRIENDSHIP_COLUMNS
    );
    let row = conn
        .query_row(&sql, params![a.to_string(), b.to_string()], row_to_friendship)
        .optional()?;
    Ok(row)
}

fn row_to_request(row: &Row<'_>) -> rusqlite::Result<FriendRequest> {
    Ok(FriendRequest {
        id: get_uuid(row, 0)?,
        sender_id: get_uuid(row, 1)?,
        receiver_id: get_uuid(row, 2)?,
        status: get_enum(row, 3)?,
        created_at: get_ts(row, 4)?,
    })
}

fn row_to_friendship(row: &Row<'_>) -> rusqlite::Result<Friendship> {
    Ok(Friendship {
        id: get_uuid(row, 0)?,
        user1_id: get_uuid(row, 1)?,
        user2_id: get_uuid(row, 2)?,
        created_at: get_ts(row, 3)?,
    })
}
