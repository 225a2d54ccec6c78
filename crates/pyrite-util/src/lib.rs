//! Shared utilities for the Pyrite package manager.
//!
//! This crate provides cross-cutting concerns used by all other Pyrite
//! crates: error types, cryptographic hashing, and terminal progress
//! indicators.

pub mod errors;
pub mod hash;
pub mod progress;
