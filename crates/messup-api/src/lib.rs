pub mod auth;
pub mod error;
pub mod friends;
pub mod gateway;
pub mod groups;
pub mod keys;
pub mod media;
pub mod messages;
pub mod middleware;
pub mod notifications;
pub mod routes;
pub mod state;
pub mod users;

pub use auth::{Authenticator, Identity, JwtAuthenticator};
pub use error::ApiError;
pub use media::{LocalMediaStore, MediaStore, StoredMedia};
pub use state::{AppState, AppStateInner};
