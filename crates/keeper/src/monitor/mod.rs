pub mod change_cache;
pub mod orchestrator;
pub mod player_count;
pub mod registry;
pub mod shutdown;

pub use change_cache::{ChangeCache, content_hash};
pub use orchestrator::{
    LogSink, MonitorTarget, Orchestrator, PollResult, ServerSnapshot, StatusSink,
};
pub use registry::ConnectionRegistry;
pub use shutdown::{ShutdownDecision, ShutdownTracker};
