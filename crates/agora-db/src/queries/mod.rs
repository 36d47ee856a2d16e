//! Per-table queries. Every function takes a borrowed connection so callers
//! can compose several of them inside one [`Database::unit_of_work`].
//!
//! [`Database::unit_of_work`]: crate::Database::unit_of_work

pub mod chat;
pub mod friends;
pub mod groups;
pub mod posts;
pub mod users;
