//! Storage backends for forumstat
//!
//! This crate implements the [`Storage`](forumstat_core::storage::Storage)
//! trait twice: an in-memory map for tests and embedding, and a single JSON
//! file that holds a whole namespace snapshot.

pub mod file;
pub mod memory;

pub use file::JsonFileStorage;
pub use memory::MemoryStorage;
