//! Pelican Keeper
//!
//! Polls the game servers of a Pelican panel for their player counts over
//! A2S, RCON and the Minecraft status protocols, stops servers that stay
//! empty, and hands changed results to a status sink.

pub mod core;
pub mod monitor;
pub mod telemetry;

pub use crate::core::{KeeperError, MonitorError, Result};
pub use monitor::{
    ChangeCache, ConnectionRegistry, LogSink, MonitorTarget, Orchestrator, PollResult,
    ShutdownDecision, ShutdownTracker, StatusSink,
};
