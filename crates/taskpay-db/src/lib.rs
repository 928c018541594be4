pub mod error;
pub mod models;
pub mod repository;

// Re-exports
pub use error::{Error, Result};
pub use models::{EventRow, PayoutRow, ProfileRow, TaskRow};
pub use repository::Database;
