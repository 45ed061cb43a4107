//! Shared utilities.

pub mod fs;

pub use fs::write_atomic;
