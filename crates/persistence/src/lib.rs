//! Call registry implementations
//!
//! The core consumes storage only through the `CallRegistry` contract.
//! This crate ships the in-memory reference implementation used for
//! development and tests; a database-backed registry implements the same
//! trait behind the same narrow surface.

mod memory;

pub use memory::InMemoryCallRegistry;
