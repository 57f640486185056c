//! Shared model types for tidemark pipeline runs.
//!
//! Kept dependency-light so the warehouse, engine, and CLI crates can all
//! share them without circular dependencies.

#![warn(clippy::pedantic)]

pub mod error;
pub mod run;
pub mod table;
