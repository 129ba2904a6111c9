mod status;

pub use status::ServerState;
