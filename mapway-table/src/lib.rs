//! # mapway-table
//!
//! The local routing table file loaded by the load balancer.
//!
//! [`TableFile`] appends entries, rewrites the file without a key, and writes
//! whole snapshots. Every rewrite goes through a sibling temp file and an
//! atomic rename, so readers only ever see the old or the new file.

pub mod error;
pub mod table_file;

pub use error::TableError;
pub use table_file::TableFile;
