//! # tide-core
//! Foundation types, constants and collaborator traits for the Tide emission
//! vault.

pub mod constants;
pub mod error;
pub mod memory;
pub mod traits;
pub mod types;
