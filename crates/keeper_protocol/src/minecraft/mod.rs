//! Minecraft status protocols (Java and Bedrock editions).

pub mod bedrock;
pub mod java;

pub use bedrock::BedrockPingSession;
pub use java::JavaStatusSession;
