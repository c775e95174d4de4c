//! HTTP handlers: thin adapters between axum extractors and the service
//! layer in `crate::services`. Handlers never contain business logic —
//! they parse/validate wire shapes, call a service function, and project
//! the result back to a wire shape.

pub mod jobs;
pub mod package;
pub mod report;
pub mod root;
pub mod rules;
pub mod scans;
pub mod stats;
