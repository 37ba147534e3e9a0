//! Fileflow Server Library
//!
//! Scheduled file-ingestion service. On every tick the scheduler fans out
//! over the configured data sources, drains their source folders into a
//! per-environment working directory, recursively expands any compressed
//! archives found there, quarantines duplicates and unsupported files,
//! packs the survivors into size-capped output bundles, and records the
//! lineage of every bundled file back to its source folder and first-level
//! archive.
//!
//! # Architecture
//!
//! - [`config`]: environment-driven service configuration
//! - [`db`]: PostgreSQL pool, row models, and the production store
//! - [`ingest`]: the per-source pipeline, extractor, lineage tracker,
//!   quarantine, bundler, scheduler, and housekeeping sweeps
//!
//! The engine talks to persistence only through [`ingest::store::IngestStore`]
//! and to the data lake only through [`ingest::datalake::DatalakeUploader`],
//! so the whole pipeline can be exercised against in-memory fakes.

pub mod config;
pub mod db;
pub mod ingest;

pub use config::Config;
