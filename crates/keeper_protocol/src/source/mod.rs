//! Source engine protocols.

pub mod a2s;
pub mod rcon;

pub use a2s::A2sSession;
pub use rcon::RconSession;
