pub mod keeper;
pub mod logging;
pub mod monitor;
pub mod panel;
pub mod server;
