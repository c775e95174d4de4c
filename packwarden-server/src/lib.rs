//! HTTP boundary for the scan coordination core: routes, handlers, auth
//! extraction, configuration loading, startup/shutdown, and the
//! background tasks (rule refresh loop, cache reaper loop).
//!
//! Split out as a library (rather than modules private to `main.rs`) so
//! integration tests can build a `Router` directly over a fake catalogue
//! store, the way `ferrex-server`'s test suite does.

pub mod api_types;
pub mod auth;
pub mod background;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod routes;
pub mod services;
pub mod state;
pub mod upstream;
