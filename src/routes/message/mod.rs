mod handler;
pub mod model;

pub use handler::{get_conversation, get_unread_count, send_message};
