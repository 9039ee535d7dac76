//! Persistence adapters
//!
//! - [`SqliteStore`]: outcomes, fleet and submissions in SQLite
//! - [`LocalImageStorage`]: evidence images on the local filesystem

pub mod images;
pub mod sqlite;

pub use images::{content_key, LocalImageStorage};
pub use sqlite::{SqliteStore, STATUS_PENDING};
