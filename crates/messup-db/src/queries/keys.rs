use anyhow::Result;
use rusqlite::params;
use uuid::Uuid;

use messup_types::models::KeySlot;

use super::{OptionalExt, ts};
use crate::{Database, now};

impl Database {
    /// Store an opaque key blob, replacing whatever was in the slot.
    pub fn put_key_blob(&self, user_id: Uuid, slot: KeySlot, blob: &[u8]) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO key_blobs (user_id, slot, blob, updated_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id, slot) DO UPDATE SET blob = excluded.blob, updated_at = excluded.updated_at",
                params![user_id.to_string(), slot.as_str(), blob, ts(&now())],
            )?;
            Ok(())
        })
    }

    pub fn get_key_blob(&self, user_id: Uuid, slot: KeySlot) -> Result<Option<Vec<u8>>> {
        self.with_conn(|conn| {
            let blob = conn
                .query_row(
                    "SELECT blob FROM key_blobs WHERE user_id = ?1 AND slot = ?2",
                    params![user_id.to_string(), slot.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(blob)
        })
    }
}
