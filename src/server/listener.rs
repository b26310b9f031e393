//! Broker listeners
//!
//! Owns the two TCP endpoints (publishers on one, subscribers on the other)
//! and the accept loops that spawn a session task per incoming connection.
//! The two acceptors run independently; one failing does not stop the other.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};

use crate::error::{BrokerError, Result, Role};
use crate::registry::{ConnectionRegistry, SubscriptionTable};
use crate::router::Router;
use crate::server::config::BrokerConfig;
use crate::server::session;
use crate::server::shutdown::ShutdownCoordinator;
use crate::stats::BrokerStats;

/// The pub/sub broker
///
/// Construct with a [`BrokerConfig`], then [`Broker::bind`] and run:
///
/// ```no_run
/// use topicast::{Broker, BrokerConfig};
///
/// #[tokio::main]
/// async fn main() -> topicast::Result<()> {
///     let broker = Broker::new(BrokerConfig::with_ports(7777, 7778));
///     let bound = broker.bind().await?;
///     bound.run_until(async { tokio::signal::ctrl_c().await.ok(); }).await
/// }
/// ```
pub struct Broker {
    config: BrokerConfig,
    subscriptions: Arc<SubscriptionTable>,
    connections: Arc<ConnectionRegistry>,
    stats: Arc<BrokerStats>,
    coordinator: Arc<ShutdownCoordinator>,
    next_session_id: Arc<AtomicU64>,
}

impl Broker {
    /// Create a broker with the given configuration
    pub fn new(config: BrokerConfig) -> Self {
        let connections = if config.replace_on_reconnect {
            ConnectionRegistry::with_replace_on_reconnect()
        } else {
            ConnectionRegistry::new()
        };

        Self {
            config,
            subscriptions: Arc::new(SubscriptionTable::new()),
            connections: Arc::new(connections),
            stats: Arc::new(BrokerStats::new()),
            coordinator: Arc::new(ShutdownCoordinator::new()),
            next_session_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Bind both listening endpoints
    ///
    /// Either bind failing is fatal; nothing is accepted until both ports are
    /// held.
    pub async fn bind(self) -> Result<BoundBroker> {
        let pub_listener =
            TcpListener::bind(self.config.pub_addr)
                .await
                .map_err(|source| BrokerError::Bind {
                    role: Role::Publisher,
                    addr: self.config.pub_addr,
                    source,
                })?;
        let sub_listener =
            TcpListener::bind(self.config.sub_addr)
                .await
                .map_err(|source| BrokerError::Bind {
                    role: Role::Subscriber,
                    addr: self.config.sub_addr,
                    source,
                })?;

        if let (Ok(pub_addr), Ok(sub_addr)) =
            (pub_listener.local_addr(), sub_listener.local_addr())
        {
            tracing::info!(pub_addr = %pub_addr, sub_addr = %sub_addr, "Broker listening");
        }

        Ok(BoundBroker {
            broker: self,
            pub_listener,
            sub_listener,
        })
    }
}

/// A broker holding both listening sockets, ready to run
pub struct BoundBroker {
    broker: Broker,
    pub_listener: TcpListener,
    sub_listener: TcpListener,
}

impl BoundBroker {
    /// Actual local address of the publisher listener
    pub fn pub_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.pub_listener.local_addr()
    }

    /// Actual local address of the subscriber listener
    pub fn sub_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.sub_listener.local_addr()
    }

    /// Shared shutdown coordinator
    ///
    /// Clone it before [`BoundBroker::run`] to trigger shutdown externally.
    pub fn coordinator(&self) -> Arc<ShutdownCoordinator> {
        Arc::clone(&self.broker.coordinator)
    }

    /// Shared broker counters
    pub fn stats(&self) -> Arc<BrokerStats> {
        Arc::clone(&self.broker.stats)
    }

    /// Run both acceptors until they stop
    ///
    /// Each acceptor stops on shutdown (silently) or on its own accept
    /// failure (reported, that port only); the sibling keeps running either
    /// way. On shutdown this returns once both acceptors have wound down; an
    /// accept failure is surfaced after that.
    pub async fn run(self) -> Result<()> {
        let broker = self.broker;
        let router = Router::new(
            Arc::clone(&broker.subscriptions),
            Arc::clone(&broker.connections),
            Arc::clone(&broker.stats),
        );

        let pub_accept = tokio::spawn(accept_publishers(
            self.pub_listener,
            router,
            broker.config.clone(),
            Arc::clone(&broker.stats),
            Arc::clone(&broker.coordinator),
            Arc::clone(&broker.next_session_id),
        ));
        let sub_accept = tokio::spawn(accept_subscribers(
            self.sub_listener,
            Arc::clone(&broker.subscriptions),
            Arc::clone(&broker.connections),
            broker.config.clone(),
            Arc::clone(&broker.stats),
            Arc::clone(&broker.coordinator),
            Arc::clone(&broker.next_session_id),
        ));

        let (pub_result, sub_result) = tokio::join!(pub_accept, sub_accept);
        pub_result.unwrap_or(Ok(()))?;
        sub_result.unwrap_or(Ok(()))
    }

    /// Run until the given future resolves, then shut down
    ///
    /// When `shutdown` resolves the coordinator closes both listeners and
    /// every open connection; I/O failures seen after that point are
    /// suppressed.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let coordinator = self.coordinator();
        let run = self.run();
        tokio::pin!(run);

        tokio::select! {
            result = &mut run => return result,
            _ = shutdown => coordinator.shutdown(),
        }

        // Wait for both acceptors to wind down
        run.await
    }
}

async fn accept_publishers(
    listener: TcpListener,
    router: Router,
    config: BrokerConfig,
    stats: Arc<BrokerStats>,
    coordinator: Arc<ShutdownCoordinator>,
    next_session_id: Arc<AtomicU64>,
) -> Result<()> {
    let mut signal = coordinator.signal();

    loop {
        let accepted = tokio::select! {
            _ = signal.triggered() => return Ok(()),
            accepted = listener.accept() => accepted,
        };
        let (socket, peer_addr) = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                if coordinator.is_shutting_down() {
                    return Ok(());
                }
                tracing::error!(error = %e, "Publisher accept failed, stopping acceptor");
                return Err(BrokerError::Accept {
                    role: Role::Publisher,
                    source: e,
                });
            }
        };

        configure_socket(&socket, &config);
        let session_id = next_session_id.fetch_add(1, Ordering::Relaxed);
        stats.record_publisher_session();
        tracing::debug!(session_id = session_id, peer = %peer_addr, "New publisher connection");

        let router = router.clone();
        let stats = Arc::clone(&stats);
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            let result = session::run_publisher_session(
                session_id,
                socket,
                router,
                stats,
                Arc::clone(&coordinator),
            )
            .await;

            if let Err(e) = result {
                if !coordinator.is_shutting_down() {
                    tracing::debug!(session_id = session_id, error = %e, "Publisher session error");
                }
            }
            tracing::debug!(session_id = session_id, "Publisher connection closed");
        });
    }
}

#[allow(clippy::too_many_arguments)]
async fn accept_subscribers(
    listener: TcpListener,
    subscriptions: Arc<SubscriptionTable>,
    connections: Arc<ConnectionRegistry>,
    config: BrokerConfig,
    stats: Arc<BrokerStats>,
    coordinator: Arc<ShutdownCoordinator>,
    next_session_id: Arc<AtomicU64>,
) -> Result<()> {
    let mut signal = coordinator.signal();

    loop {
        let accepted = tokio::select! {
            _ = signal.triggered() => return Ok(()),
            accepted = listener.accept() => accepted,
        };
        let (socket, peer_addr) = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                if coordinator.is_shutting_down() {
                    return Ok(());
                }
                tracing::error!(error = %e, "Subscriber accept failed, stopping acceptor");
                return Err(BrokerError::Accept {
                    role: Role::Subscriber,
                    source: e,
                });
            }
        };

        configure_socket(&socket, &config);
        let session_id = next_session_id.fetch_add(1, Ordering::Relaxed);
        stats.record_subscriber_session();
        tracing::debug!(session_id = session_id, peer = %peer_addr, "New subscriber connection");

        let subscriptions = Arc::clone(&subscriptions);
        let connections = Arc::clone(&connections);
        let stats = Arc::clone(&stats);
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            let result = session::run_subscriber_session(
                session_id,
                socket,
                subscriptions,
                connections,
                stats,
                Arc::clone(&coordinator),
            )
            .await;

            if let Err(e) = result {
                if !coordinator.is_shutting_down() {
                    tracing::debug!(session_id = session_id, error = %e, "Subscriber session error");
                }
            }
            tracing::debug!(session_id = session_id, "Subscriber connection closed");
        });
    }
}

fn configure_socket(socket: &TcpStream, config: &BrokerConfig) {
    if config.tcp_nodelay {
        if let Err(e) = socket.set_nodelay(true) {
            tracing::debug!(error = %e, "Failed to set TCP_NODELAY");
        }
    }
}
