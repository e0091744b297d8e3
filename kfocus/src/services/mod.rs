mod chat;
mod sessions;

pub use chat::{ChatService, PreparedChat};
pub use sessions::SessionService;
