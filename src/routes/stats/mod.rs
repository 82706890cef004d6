mod handler;
pub mod model;
mod worker;

pub use handler::{get_global_stats, get_my_stats};
pub use worker::refresh_stats_loop;
