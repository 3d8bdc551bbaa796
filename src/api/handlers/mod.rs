//! HTTP request handlers

pub mod facets;
pub mod health;
pub mod ingest;
pub mod keys;
pub mod logs;
pub mod members;
pub mod purge;
pub mod search;
pub mod usage;
