//! SQLite archive range catalog.
//!
//! The catalog maps book id ranges to archive filenames, and carries the
//! small per-book lookups the serving path needs:
//! - **Ranges**: `(filename, start_id, end_id, priority)`, maintained by the
//!   reconciler and read by the resolver
//! - **Filename hints**: the authoritative entry name of a book inside its
//!   archive
//! - **Cover pointers**: precomputed cover entries in the attachments archive
//! - **Books**: native format per book; the largest id is the library size
//!
//! The catalog can drift from what is actually on disk. Only the offline
//! tools repair it.

mod db;
pub mod error;
mod models;
mod repo;

pub use crate::db::Database;
pub use crate::models::CatalogEntry;
pub use crate::repo::Repository;
