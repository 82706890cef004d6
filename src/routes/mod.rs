pub mod feed;
pub mod message;
pub mod mood;
pub mod stats;
pub mod user;
