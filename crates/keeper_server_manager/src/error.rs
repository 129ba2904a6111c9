use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ServerManagerError {
    ApiError(String),
    ParseError(String),
    IoError(String),
}

impl fmt::Display for ServerManagerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerManagerError::ApiError(msg) => write!(f, "API Error: {}", msg),
            ServerManagerError::ParseError(msg) => write!(f, "Parse Error: {}", msg),
            ServerManagerError::IoError(e) => write!(f, "I/O Error: {}", e),
        }
    }
}

impl Error for ServerManagerError {}

impl From<std::io::Error> for ServerManagerError {
    fn from(error: std::io::Error) -> Self {
        ServerManagerError::IoError(error.to_string())
    }
}

impl From<reqwest::Error> for ServerManagerError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            ServerManagerError::ParseError(error.to_string())
        } else {
            ServerManagerError::ApiError(error.to_string())
        }
    }
}

impl From<serde_json::Error> for ServerManagerError {
    fn from(error: serde_json::Error) -> Self {
        ServerManagerError::ParseError(error.to_string())
    }
}
