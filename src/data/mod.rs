//! Data layer module
//!
//! Handles all data persistence:
//! - SQLite database operations (users, sessions)
//! - The `UserStore` seam used by the auth layer

mod database;
mod models;
mod store;

pub use database::Database;
pub use models::*;
pub use store::UserStore;

#[cfg(test)]
pub use store::MockUserStore;
