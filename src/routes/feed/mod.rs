mod handler;
pub mod model;

pub use handler::{get_feed, get_feed_grid};
