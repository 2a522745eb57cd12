//! Shared domain types for beacon.
//!
//! This crate contains the data model exchanged by the bot: command and
//! service envelopes, broadcast frames, the `Report` events written to the
//! output sink, the startup configuration, and their error types.
//!
//! Zero I/O -- only serde, serde_json, thiserror.

pub mod config;
pub mod envelope;
pub mod error;
pub mod report;
