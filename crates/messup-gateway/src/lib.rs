pub mod dispatcher;
pub mod sessions;
pub mod topics;

pub use dispatcher::Dispatcher;
pub use sessions::{SessionHandle, SessionRegistry};
pub use topics::TopicRegistry;
