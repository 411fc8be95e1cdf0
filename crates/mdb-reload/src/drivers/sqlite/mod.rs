//! SQLite source driver.
//!
//! - [`SqliteSource`]: read-only catalog and snapshot reader for the game
//!   database files

mod reader;

pub use reader::SqliteSource;
