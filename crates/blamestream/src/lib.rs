//! Blamestream library
//!
//! Streams `git blame --incremental` results to HTTP clients as Server-Sent-Events,
//! newest hunks first, so partial attribution reaches the client even when the full
//! history walk never finishes.

pub mod api;
pub mod authz;
pub mod blame;
pub mod config;
pub mod flags;
pub mod repo;
pub mod stream;
pub mod trace;

pub use blamestream_protocol as protocol;
