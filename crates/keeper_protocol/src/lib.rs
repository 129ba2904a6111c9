//! Game server query protocols for Pelican Keeper
//!
//! This crate provides the wire codecs used to poll remote game servers for
//! their player counts: Source engine A2S, Source RCON, Minecraft Java status
//! and Minecraft Bedrock (RakNet) unconnected ping. Each codec is exposed
//! through the [`QuerySession`] capability so callers never branch on the
//! protocol themselves.

pub mod error;
pub mod minecraft;
pub mod session;
pub mod source;
pub mod types;

// Re-export the most commonly used types
pub use error::{QueryError, QueryErrorKind, Result};
pub use minecraft::{BedrockPingSession, JavaStatusSession};
pub use session::{ProtocolMethod, QuerySession, QueryTarget, open_session};
pub use source::{A2sSession, RconSession};
pub use types::{ProtocolRead, ProtocolWrite};
