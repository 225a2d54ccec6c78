//! Dependency resolution engine: backtracking search with checkpointed
//! state, lazy metadata lookup, deterministic candidate ordering, and
//! explainable conflict reporting.

pub mod cache;
pub mod conflict;
pub mod graph;
pub mod provider;
pub mod resolver;
