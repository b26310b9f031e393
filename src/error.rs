//! Broker error types
//!
//! Almost every failure the broker sees is scoped to a single line or a
//! single session and is handled in place; only startup failures and the
//! accept loops surface errors through this type.

use std::net::SocketAddr;

/// Which listening endpoint an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The publisher-facing port
    Publisher,
    /// The subscriber-facing port
    Subscriber,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Publisher => write!(f, "publisher"),
            Role::Subscriber => write!(f, "subscriber"),
        }
    }
}

/// Error type for broker operations
#[derive(Debug)]
pub enum BrokerError {
    /// A listening endpoint could not be bound; fatal at startup
    Bind {
        role: Role,
        addr: SocketAddr,
        source: std::io::Error,
    },
    /// An accept loop failed while the broker was running
    Accept { role: Role, source: std::io::Error },
}

impl std::fmt::Display for BrokerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BrokerError::Bind { role, addr, source } => {
                write!(f, "failed to bind {} port at {}: {}", role, addr, source)
            }
            BrokerError::Accept { role, source } => {
                write!(f, "accept failed on {} port: {}", role, source)
            }
        }
    }
}

impl std::error::Error for BrokerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BrokerError::Bind { source, .. } => Some(source),
            BrokerError::Accept { source, .. } => Some(source),
        }
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, BrokerError>;
