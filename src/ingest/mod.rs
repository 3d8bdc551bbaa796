//! Ingestion worker: consumes accepted submissions from the bus

pub mod worker;

pub use worker::IngestWorker;
