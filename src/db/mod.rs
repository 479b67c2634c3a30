//! Persistence layer for the sync cursor.

pub mod cursor;

pub use cursor::{CursorError, CursorStore, FileCursorStore};
