/// Database row types that carry columns the API never exposes.
use chrono::{DateTime, Utc};
use uuid::Uuid;

use messup_types::models::User;

pub struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password: String,
    pub created_at: DateTime<Utc>,
}

impl UserRow {
    pub fn into_user(self) -> User {
        User {
            id: self.id,
            username: self.username,
            email: self.email,
            created_at: self.created_at,
        }
    }
}
