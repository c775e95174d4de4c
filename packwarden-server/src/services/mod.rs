//! Service layer: the request-handling logic behind spec.md §4.D-G, kept
//! independent of axum so it can be unit-tested without a running server
//! (mirroring the teacher's explicit-handler-arguments style over
//! decorator-based DI; see SPEC_FULL.md's design-notes section).

pub mod dispatch;
pub mod ingestion;
pub mod lookup;
pub mod report;
