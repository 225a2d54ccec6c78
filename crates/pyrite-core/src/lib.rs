//! Core data model for the Pyrite package manager: package names,
//! versions, specifier sets, environment markers, requirements, the
//! project manifest, and the lockfile format.

pub mod lockfile;
pub mod manifest;
pub mod marker;
pub mod requirement;
pub mod specifier;
pub mod version;
