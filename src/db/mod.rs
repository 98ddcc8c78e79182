//! Database module for the Estatehub server
//!
//! Pool lifecycle lives in `operations`; every other submodule adds an
//! `impl DbOperations` block for one group of tables.

pub mod analytics;
pub mod catalog;
pub mod chats;
pub mod models;
pub mod notifications;
pub mod operations;
pub mod properties;
pub mod reservations;
pub mod reviews;
pub mod search;
pub mod subscribers;
pub mod users;
pub mod wishlists;

pub use models::{Property, Reservation, User};
pub use operations::DbOperations;
pub use search::{GeoPoint, Page, PropertyFilter, SortOrder};
