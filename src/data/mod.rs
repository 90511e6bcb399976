//! Data layer for the annotation store.
//!
//! Handles persisting sequences and annotations, querying them back, and
//! loading pipeline results into the store.

mod ingest;
mod models;
mod storage;

pub use ingest::ingest_samples;
pub use models::Summary;
pub use storage::AnnotationDatabase;
