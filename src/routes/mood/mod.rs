mod handler;
pub mod model;

pub use handler::{get_my_moods, submit_mood};
