pub mod analysis;
pub mod analytics;
pub mod config;
pub mod errors;
pub mod fingerprint;
pub mod ingest;
pub mod model;
pub mod parser;
pub mod storage;
