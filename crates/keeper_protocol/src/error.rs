//! Error taxonomy shared by every query codec

use std::io;
use thiserror::Error;

/// Error type for query protocol operations
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Timed out waiting for server response ({0})")]
    Timeout(String),

    #[error("Could not connect to server {addr}: {source}")]
    ConnectionFailure {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("RCON authentication failed for {0}")]
    AuthFailure(String),

    #[error("Session is not connected, call connect() first")]
    NotConnected,

    #[error("IO Error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    Timeout,
    ConnectionFailure,
    ProtocolViolation,
    AuthFailure,
    Io,
}

impl QueryError {
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn violation(msg: impl Into<String>) -> Self {
        Self::ProtocolViolation(msg.into())
    }

    pub fn connection(addr: impl Into<String>, source: io::Error) -> Self {
        Self::ConnectionFailure {
            addr: addr.into(),
            source,
        }
    }

    /// Returns the kind of error, similar to how std::io::Error works
    pub fn kind(&self) -> QueryErrorKind {
        match self {
            QueryError::Timeout(_) => QueryErrorKind::Timeout,
            QueryError::ConnectionFailure { .. } => QueryErrorKind::ConnectionFailure,
            QueryError::ProtocolViolation(_) => QueryErrorKind::ProtocolViolation,
            QueryError::AuthFailure(_) => QueryErrorKind::AuthFailure,
            QueryError::NotConnected => QueryErrorKind::ConnectionFailure,
            QueryError::Io(e) => match e.kind() {
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => QueryErrorKind::Timeout,
                io::ErrorKind::ConnectionRefused
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::UnexpectedEof => QueryErrorKind::ConnectionFailure,
                io::ErrorKind::InvalidData => QueryErrorKind::ProtocolViolation,
                _ => QueryErrorKind::Io,
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;
