//! Library surface for `main-worker`, split out from the binary so
//! crate-level integration tests (`tests/`) can exercise the registry,
//! router, and auth modules directly against a real gRPC loopback.

pub mod auth;
pub mod handlers;
pub mod models;
pub mod registry;
pub mod router;
pub mod rpc;
pub mod session;
