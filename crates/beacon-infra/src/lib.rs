//! Infrastructure implementations for beacon.
//!
//! Implements the transport ports defined in `beacon-core` over ZeroMQ and
//! loads the startup configuration from TOML files.

pub mod config;
pub mod zmq;
