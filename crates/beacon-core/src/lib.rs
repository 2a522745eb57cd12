//! Messaging logic for the beacon bot.
//!
//! This crate defines the transport "ports" (traits) that the infrastructure
//! layer implements, plus everything that runs on top of them: the envelope
//! codec, the command loop, the broadcast loop and the lifecycle supervisor.
//! It depends only on `beacon-types` -- never on `beacon-infra` or any
//! socket library.

pub mod broadcast;
pub mod codec;
pub mod command;
pub mod lifecycle;
pub mod memory;
pub mod sink;
pub mod supervisor;
pub mod transport;

pub use broadcast::BroadcastLoop;
pub use command::CommandLoop;
pub use lifecycle::TerminationSignal;
pub use sink::{MemorySink, OutputSink};
pub use supervisor::{LoopExit, ShutdownSummary, Supervisor};
pub use transport::{BroadcastChannel, CommandChannel, Connector};
