//! Core of the image archive: a relational store keyed by 64-bit perceptual
//! fingerprint, the difference-hash fingerprint function, and the ingestion
//! engine that deduplicates incoming images against the store.
//!
//! The store is consumed through the [`ImageStore`] trait so the HTTP shell
//! (and tests) can inject any backing implementation; [`SqliteStore`] is the
//! durable one. [`Ingestor`] owns the files under the storage root and
//! implements the "larger copy wins" conflict policy.

pub mod error;
pub mod hasher;
pub mod ingest;
pub mod store;

pub use error::{Error, Result};
pub use ingest::{Ingested, IngestOutcome, Ingestor};
pub use store::{ImageRecord, ImageStore, SqliteStore};
