//! The broker server: configuration, listeners, session loops, and the
//! shutdown lifecycle

pub mod config;
pub mod listener;
pub mod session;
pub mod shutdown;

pub use config::BrokerConfig;
pub use listener::{BoundBroker, Broker};
pub use shutdown::{ShutdownCoordinator, ShutdownSignal};
