//! Shared routing state: topic subscriptions and live connections
//!
//! Two stores back the router. The [`SubscriptionTable`] answers "who wants
//! this topic", the [`ConnectionRegistry`] answers "where does that id live
//! right now". Both are concurrency-safe and expose only atomic operations;
//! the underlying maps are never handed out for external mutation.
//!
//! # Architecture
//!
//! ```text
//!         Arc<SubscriptionTable>         Arc<ConnectionRegistry>
//!        ┌──────────────────────┐       ┌───────────────────────┐
//!        │ topic -> {sub ids}   │       │ sub id -> Handle {    │
//!        │                      │       │   tx: mpsc::Sender,   │
//!        └──────────┬───────────┘       │ }                     │
//!                   │                   └───────────┬───────────┘
//!                   │   Router::route(topic, msg)   │
//!                   └───────────────┬───────────────┘
//!                                   ▼
//!                  per-connection writer task ──► TCP
//! ```
//!
//! Events are `bytes::Bytes`, formatted once per publish; every subscriber
//! queue shares the same allocation by reference count.
//!
//! When an operation touches both stores, the subscription table is locked
//! before the connection registry, and never both at once.

pub mod connections;
pub mod subscriptions;

pub use connections::{ConnectionHandle, ConnectionRegistry};
pub use subscriptions::SubscriptionTable;
