mod handler;
pub mod model;

pub use handler::{
    check_token, login, refresh_token, register, reset_password, update_nickname, update_password,
};
