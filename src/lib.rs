//! topicast: a minimal TCP pub/sub broker
//!
//! Publishers and subscribers connect on separate ports and speak a
//! newline-delimited, space-separated text protocol, one command per line:
//!
//! ```text
//! publisher  -> broker      <PUB_ID> pub <TOPIC> <MESSAGE>
//! broker     -> publisher   OK
//! subscriber -> broker      <SUB_ID> sub <TOPIC> | <SUB_ID> unsub <TOPIC>
//! broker     -> subscriber  OK, and asynchronously: <TOPIC> <MESSAGE>
//! ```
//!
//! Delivery is best-effort at-most-once to every connection subscribed to
//! the topic at the moment of publish. There is no persistence, no replay
//! for late joiners, no authentication, and no ordering guarantee across
//! different subscribers.
//!
//! # Example
//!
//! ```no_run
//! use topicast::{Broker, BrokerConfig};
//!
//! #[tokio::main]
//! async fn main() -> topicast::Result<()> {
//!     let broker = Broker::new(BrokerConfig::with_ports(7777, 7778));
//!     let bound = broker.bind().await?;
//!     bound.run_until(async { tokio::signal::ctrl_c().await.ok(); }).await
//! }
//! ```

pub mod error;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod server;
pub mod stats;

pub use error::{BrokerError, Result, Role};
pub use protocol::{Command, ParseError};
pub use router::Router;
pub use server::{BoundBroker, Broker, BrokerConfig, ShutdownCoordinator};
pub use stats::BrokerStats;
