//! Library surface for `processing-worker`, split out from the binary
//! so crate-level integration tests (`tests/`) can drive the handshake,
//! key cell, and `Entity` RPC service directly.

pub mod handshake;
pub mod keycell;
pub mod rpc;
