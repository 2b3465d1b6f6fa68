//! Integration test suite for the Tide emission vault.
//!
//! The tests under `tests/` drive the vault, schedule, boost calculator and
//! receivers together through the shared [`helpers::Harness`].

pub mod helpers;
