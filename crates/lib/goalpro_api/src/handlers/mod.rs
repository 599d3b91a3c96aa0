//! Request handlers.

pub mod auth;
pub mod status;
pub mod teams;
pub mod users;
