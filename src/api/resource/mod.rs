pub mod dto;
pub mod handlers;
mod routes;

pub use routes::{PROFILE_PATH, routes};
