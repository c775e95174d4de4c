//! Domain types, the catalogue store port (+ Postgres/fake implementations),
//! the rule snapshot fetcher, and the in-process job cache for the scan
//! coordination core.
//!
//! This crate has no HTTP concerns; it is consumed by `packwarden-server`,
//! which wires these pieces to axum handlers.

pub mod cache;
pub mod catalogue;
pub mod domain;
pub mod error;
pub mod rules;

pub use cache::{CacheSize, JobCache};
pub use catalogue::{CatalogueStore, ScanQuery, Stats};
pub use error::{CoreError, CoreResult};
pub use rules::{RuleSnapshot, RuleSnapshotService};
