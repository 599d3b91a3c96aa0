//! # goalpro_core
//!
//! Core domain logic for GoalPro: credential storage, session tokens,
//! password reset and role-based authorization.

pub mod auth;
pub mod mailer;
pub mod migrate;
pub mod models;
pub mod store;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_not_empty() {
        assert!(!version().is_empty());
    }
}
