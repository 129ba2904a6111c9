pub mod error;

pub use error::{KeeperError, MonitorError, Result};
