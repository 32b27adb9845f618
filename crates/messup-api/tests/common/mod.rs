#![allow(dead_code)]

use std::sync::Arc;

use tempfile::TempDir;

use messup_api::{AppState, AppStateInner, Identity, JwtAuthenticator, LocalMediaStore};
use messup_db::{Database, NewUserOutcome};
use messup_gateway::Dispatcher;

pub const SECRET: &str = "integration-test-secret";

/// A fresh in-memory server state. Keep the returned TempDir alive for as
/// long as media uploads need to be readable.
pub fn test_state() -> (AppState, TempDir) {
    let media_dir = tempfile::tempdir().expect("tempdir");
    let state = AppStateInner::new(
        Database::open_in_memory().expect("in-memory db"),
        Dispatcher::new(),
        Arc::new(JwtAuthenticator::new(SECRET, chrono::Duration::days(1))),
        Arc::new(LocalMediaStore::new(media_dir.path(), "http://media.test")),
    );
    (state, media_dir)
}

/// Insert a user straight into the database, skipping password hashing.
pub fn user(state: &AppState, name: &str) -> Identity {
    match state
        .db
        .create_user(name, &format!("{}@example.com", name), "not-a-real-hash")
        .expect("create user")
    {
        NewUserOutcome::Created(user) => Identity {
            user_id: user.id,
            username: user.username,
        },
        other => panic!("could not create {}: {:?}", name, other),
    }
}
