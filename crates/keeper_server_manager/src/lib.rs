mod api;
mod error;
mod monitor;

pub use api::*;
pub use error::*;
pub use monitor::*;
