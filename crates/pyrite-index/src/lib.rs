//! Remote package index access: repository configuration and the HTTP
//! metadata client that backs the resolver.

pub mod client;
pub mod repository;
