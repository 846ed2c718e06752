//! ChunkFS Test & Validation Infrastructure
//!
//! Shared test environment plus cross-crate tests: the documented scan and
//! chunking scenarios, the adapter over chunk-backed content, concurrent
//! readers, and property tests over the full upload/mount/read path.

pub mod harness;

#[cfg(test)]
mod concurrency_tests;
#[cfg(test)]
mod proptest_transfer;

pub use harness::{ChunkedMount, TestEnv};
