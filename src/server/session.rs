//! Per-connection session loops
//!
//! One task per accepted connection. A session is OPEN when spawned, READING
//! for its whole useful life, and CLOSED when its loop exits; closed is
//! terminal, the broker never reconnects or retries. Loops are generic over
//! the stream so they can be driven through `tokio::io::duplex` in tests.
//!
//! A subscriber connection has two producers (command acknowledgements and
//! routed events), so all of its output funnels through one queue drained by
//! a dedicated writer task. That single writer keeps per-connection write
//! order and means a slow subscriber delays only its own queue, never the
//! router's fan-out loop or the publisher's acknowledgement.

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use crate::protocol::constants::OK_REPLY;
use crate::protocol::Command;
use crate::registry::{ConnectionHandle, ConnectionRegistry, SubscriptionTable};
use crate::router::Router;
use crate::server::shutdown::ShutdownCoordinator;
use crate::stats::BrokerStats;

/// Run a publisher session to completion
///
/// Reads one command per line. Well-formed publishes are routed and answered
/// with `OK`; anything else is a protocol error logged at line granularity
/// with no reply, no state change, and no session termination. Peer EOF ends
/// the session cleanly; so does the shutdown signal.
pub(crate) async fn run_publisher_session<S>(
    session_id: u64,
    stream: S,
    router: Router,
    stats: Arc<BrokerStats>,
    coordinator: Arc<ShutdownCoordinator>,
) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut lines = BufReader::new(read_half).lines();
    let mut signal = coordinator.signal();

    loop {
        let line = tokio::select! {
            _ = signal.triggered() => return Ok(()),
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            // Peer EOF
            return Ok(());
        };

        match Command::parse(&line) {
            Command::Publish { id, topic, message } => {
                let delivered = router.route(&topic, &message).await;
                write_half.write_all(OK_REPLY).await?;
                tracing::debug!(
                    session_id = session_id,
                    publisher_id = %id,
                    topic = %topic,
                    delivered = delivered,
                    "Publish accepted"
                );
            }
            Command::Subscribe { .. } | Command::Unsubscribe { .. } => {
                stats.record_protocol_error();
                tracing::warn!(
                    session_id = session_id,
                    line = %line,
                    "Subscriber command on publisher port, skipping line"
                );
            }
            Command::Invalid { line, reason } => {
                stats.record_protocol_error();
                tracing::warn!(
                    session_id = session_id,
                    line = %line,
                    reason = %reason,
                    "Malformed publisher line, skipping"
                );
            }
        }
    }
}

/// Run a subscriber session to completion
///
/// On the first well-formed command from a previously-unseen id, the
/// connection's outbound handle is registered under that id; an existing
/// mapping is left untouched (first-registration-wins, see the registry).
/// `sub`/`unsub` then mutate the subscription table and `OK` is queued behind
/// any events already bound for this connection.
pub(crate) async fn run_subscriber_session<S>(
    session_id: u64,
    stream: S,
    subscriptions: Arc<SubscriptionTable>,
    connections: Arc<ConnectionRegistry>,
    stats: Arc<BrokerStats>,
    coordinator: Arc<ShutdownCoordinator>,
) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut lines = BufReader::new(read_half).lines();
    let mut signal = coordinator.signal();

    // Single writer for this connection: acknowledgements and routed events
    // share one FIFO queue.
    let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
    let mut writer_signal = coordinator.signal();
    let writer = tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = writer_signal.triggered() => break,
                event = rx.recv() => event,
            };
            let Some(event) = event else { break };
            if let Err(e) = write_half.write_all(&event).await {
                tracing::debug!(session_id = session_id, error = %e, "Subscriber write failed");
                break;
            }
        }
    });

    let handle = ConnectionHandle::new(session_id, tx.clone());

    let result = subscriber_read_loop(
        session_id,
        &mut lines,
        &mut signal,
        handle,
        &tx,
        &subscriptions,
        &connections,
        &stats,
    )
    .await;

    // The registry may hold a clone of the queue sender forever, so the
    // writer is stopped explicitly; aborting drops the receiver and future
    // sends to this id fail as routing misses.
    writer.abort();

    result
}

#[allow(clippy::too_many_arguments)]
async fn subscriber_read_loop<R>(
    session_id: u64,
    lines: &mut tokio::io::Lines<BufReader<R>>,
    signal: &mut crate::server::shutdown::ShutdownSignal,
    handle: ConnectionHandle,
    tx: &mpsc::UnboundedSender<Bytes>,
    subscriptions: &SubscriptionTable,
    connections: &ConnectionRegistry,
    stats: &BrokerStats,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    loop {
        let line = tokio::select! {
            _ = signal.triggered() => return Ok(()),
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            return Ok(());
        };

        let (id, topic, subscribe) = match Command::parse(&line) {
            Command::Subscribe { id, topic } => (id, topic, true),
            Command::Unsubscribe { id, topic } => (id, topic, false),
            Command::Publish { .. } => {
                stats.record_protocol_error();
                tracing::warn!(
                    session_id = session_id,
                    line = %line,
                    "Publish command on subscriber port, skipping line"
                );
                continue;
            }
            Command::Invalid { line, reason } => {
                stats.record_protocol_error();
                tracing::warn!(
                    session_id = session_id,
                    line = %line,
                    reason = %reason,
                    "Malformed subscriber line, skipping"
                );
                continue;
            }
        };

        if connections.register(&id, handle.clone()).await {
            tracing::debug!(
                session_id = session_id,
                subscriber_id = %id,
                "Connection registered"
            );
        }

        if subscribe {
            subscriptions.subscribe(&topic, &id).await;
            tracing::debug!(
                session_id = session_id,
                subscriber_id = %id,
                topic = %topic,
                "Subscribed"
            );
        } else {
            subscriptions.unsubscribe(&topic, &id).await;
            tracing::debug!(
                session_id = session_id,
                subscriber_id = %id,
                topic = %topic,
                "Unsubscribed"
            );
        }

        if tx.send(Bytes::from_static(OK_REPLY)).is_err() {
            // Writer is gone, the connection is effectively closed
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "subscriber writer closed",
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{duplex, AsyncWriteExt, DuplexStream};
    use tokio::sync::mpsc;
    use tokio_test::assert_ok;

    use super::*;
    use crate::registry::ConnectionHandle;

    struct Fixture {
        subscriptions: Arc<SubscriptionTable>,
        connections: Arc<ConnectionRegistry>,
        stats: Arc<BrokerStats>,
        coordinator: Arc<ShutdownCoordinator>,
        router: Router,
    }

    impl Fixture {
        fn new() -> Self {
            let subscriptions = Arc::new(SubscriptionTable::new());
            let connections = Arc::new(ConnectionRegistry::new());
            let stats = Arc::new(BrokerStats::new());
            let router = Router::new(
                Arc::clone(&subscriptions),
                Arc::clone(&connections),
                Arc::clone(&stats),
            );
            Self {
                subscriptions,
                connections,
                stats,
                coordinator: Arc::new(ShutdownCoordinator::new()),
                router,
            }
        }

        fn spawn_publisher(&self, stream: DuplexStream) -> tokio::task::JoinHandle<std::io::Result<()>> {
            let router = self.router.clone();
            let stats = Arc::clone(&self.stats);
            let coordinator = Arc::clone(&self.coordinator);
            tokio::spawn(run_publisher_session(1, stream, router, stats, coordinator))
        }

        fn spawn_subscriber(
            &self,
            session_id: u64,
            stream: DuplexStream,
        ) -> tokio::task::JoinHandle<std::io::Result<()>> {
            tokio::spawn(run_subscriber_session(
                session_id,
                stream,
                Arc::clone(&self.subscriptions),
                Arc::clone(&self.connections),
                Arc::clone(&self.stats),
                Arc::clone(&self.coordinator),
            ))
        }
    }

    async fn read_line(lines: &mut tokio::io::Lines<BufReader<tokio::io::ReadHalf<DuplexStream>>>) -> String {
        tokio::time::timeout(Duration::from_secs(1), lines.next_line())
            .await
            .expect("timed out waiting for line")
            .expect("read failed")
            .expect("unexpected EOF")
    }

    #[tokio::test]
    async fn test_publisher_publish_replies_ok_and_routes() {
        let fixture = Fixture::new();

        // Wire a fake subscriber connection straight into the registry
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();
        fixture
            .connections
            .register("s1", ConnectionHandle::new(9, event_tx))
            .await;
        fixture.subscriptions.subscribe("weather", "s1").await;

        let (client, server) = duplex(1024);
        let session = fixture.spawn_publisher(server);

        let (read_half, mut write_half) = tokio::io::split(client);
        let mut lines = BufReader::new(read_half).lines();

        write_half
            .write_all(b"p1 pub weather rain-expected\n")
            .await
            .unwrap();
        assert_eq!(read_line(&mut lines).await, "OK");
        assert_eq!(
            &event_rx.recv().await.unwrap()[..],
            b"weather rain-expected\n"
        );

        drop(write_half);
        drop(lines);
        tokio_test::assert_ok!(session.await.unwrap());
    }

    #[tokio::test]
    async fn test_publisher_malformed_line_gets_no_reply_and_session_survives() {
        let fixture = Fixture::new();
        let (client, server) = duplex(1024);
        let session = fixture.spawn_publisher(server);

        let (read_half, mut write_half) = tokio::io::split(client);
        let mut lines = BufReader::new(read_half).lines();

        // Bare word, then a wrong verb, then a good line: only the good line
        // is acknowledged
        write_half.write_all(b"hello\n").await.unwrap();
        write_half.write_all(b"id badverb topic\n").await.unwrap();
        write_half.write_all(b"p1 pub weather sunny\n").await.unwrap();

        assert_eq!(read_line(&mut lines).await, "OK");
        assert_eq!(fixture.stats.protocol_errors(), 2);
        assert_eq!(fixture.stats.publishes(), 1);

        drop(write_half);
        drop(lines);
        tokio_test::assert_ok!(session.await.unwrap());
    }

    #[tokio::test]
    async fn test_publisher_eof_ends_session_cleanly() {
        let fixture = Fixture::new();
        let (client, server) = duplex(1024);
        let session = fixture.spawn_publisher(server);

        drop(client);
        let result = tokio::time::timeout(Duration::from_secs(1), session)
            .await
            .expect("session should end on EOF")
            .unwrap();
        tokio_test::assert_ok!(result);
    }

    #[tokio::test]
    async fn test_subscriber_sub_then_event_then_unsub() {
        let fixture = Fixture::new();
        let (client, server) = duplex(1024);
        let _session = fixture.spawn_subscriber(1, server);

        let (read_half, mut write_half) = tokio::io::split(client);
        let mut lines = BufReader::new(read_half).lines();

        write_half.write_all(b"s1 sub weather\n").await.unwrap();
        assert_eq!(read_line(&mut lines).await, "OK");

        let delivered = fixture.router.route("weather", "rain expected").await;
        assert_eq!(delivered, 1);
        assert_eq!(read_line(&mut lines).await, "weather rain expected");

        write_half.write_all(b"s1 unsub weather\n").await.unwrap();
        assert_eq!(read_line(&mut lines).await, "OK");

        assert_eq!(fixture.router.route("weather", "sunny").await, 0);
    }

    #[tokio::test]
    async fn test_subscriber_unsub_of_unknown_topic_is_acknowledged() {
        let fixture = Fixture::new();
        let (client, server) = duplex(1024);
        let _session = fixture.spawn_subscriber(1, server);

        let (read_half, mut write_half) = tokio::io::split(client);
        let mut lines = BufReader::new(read_half).lines();

        write_half.write_all(b"s1 unsub nonexistent\n").await.unwrap();
        assert_eq!(read_line(&mut lines).await, "OK");
        assert_eq!(fixture.stats.protocol_errors(), 0);
    }

    #[tokio::test]
    async fn test_subscriber_malformed_line_is_skipped() {
        let fixture = Fixture::new();
        let (client, server) = duplex(1024);
        let _session = fixture.spawn_subscriber(1, server);

        let (read_half, mut write_half) = tokio::io::split(client);
        let mut lines = BufReader::new(read_half).lines();

        write_half.write_all(b"hello\n").await.unwrap();
        write_half.write_all(b"s1 sub weather\n").await.unwrap();

        // Only the well-formed line is acknowledged
        assert_eq!(read_line(&mut lines).await, "OK");
        assert_eq!(fixture.stats.protocol_errors(), 1);
        assert!(fixture.subscriptions.is_subscribed("weather", "s1").await);
    }

    #[tokio::test]
    async fn test_subscriber_disconnect_leaves_subscription_as_routing_miss() {
        let fixture = Fixture::new();
        let (client, server) = duplex(1024);
        let session = fixture.spawn_subscriber(1, server);

        let (read_half, mut write_half) = tokio::io::split(client);
        let mut lines = BufReader::new(read_half).lines();

        write_half.write_all(b"s2 sub weather\n").await.unwrap();
        assert_eq!(read_line(&mut lines).await, "OK");

        // Disconnect without unsubscribing
        drop(write_half);
        drop(lines);
        tokio::time::timeout(Duration::from_secs(1), session)
            .await
            .expect("session should end on EOF")
            .unwrap()
            .unwrap();

        // Wait for the connection's writer task to be torn down
        let handle = fixture.connections.lookup("s2").await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), async {
            while handle.is_live() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("writer should stop after disconnect");

        // Subscription persists; routing skips the dead connection silently
        assert!(fixture.subscriptions.is_subscribed("weather", "s2").await);
        assert_eq!(fixture.router.route("weather", "storm").await, 0);
        assert!(fixture.stats.routing_misses() > 0);
    }

    #[tokio::test]
    async fn test_second_connection_with_same_id_does_not_take_over() {
        let fixture = Fixture::new();

        let (client_a, server_a) = duplex(1024);
        let _session_a = fixture.spawn_subscriber(1, server_a);
        let (read_a, mut write_a) = tokio::io::split(client_a);
        let mut lines_a = BufReader::new(read_a).lines();

        write_a.write_all(b"s1 sub weather\n").await.unwrap();
        assert_eq!(read_line(&mut lines_a).await, "OK");

        let (client_b, server_b) = duplex(1024);
        let _session_b = fixture.spawn_subscriber(2, server_b);
        let (read_b, mut write_b) = tokio::io::split(client_b);
        let mut lines_b = BufReader::new(read_b).lines();

        write_b.write_all(b"s1 sub weather\n").await.unwrap();
        assert_eq!(read_line(&mut lines_b).await, "OK");

        // Events still go to the first connection only
        fixture.router.route("weather", "rain").await;
        assert_eq!(read_line(&mut lines_a).await, "weather rain");

        let raced =
            tokio::time::timeout(Duration::from_millis(50), lines_b.next_line()).await;
        assert!(raced.is_err(), "second connection must receive nothing");
    }

    #[tokio::test]
    async fn test_shutdown_unblocks_both_session_kinds() {
        let fixture = Fixture::new();

        let (_pub_client, pub_server) = duplex(1024);
        let (_sub_client, sub_server) = duplex(1024);
        let publisher = fixture.spawn_publisher(pub_server);
        let subscriber = fixture.spawn_subscriber(2, sub_server);

        fixture.coordinator.shutdown();

        let pub_result = tokio::time::timeout(Duration::from_secs(1), publisher)
            .await
            .expect("publisher session should unblock on shutdown")
            .unwrap();
        let sub_result = tokio::time::timeout(Duration::from_secs(1), subscriber)
            .await
            .expect("subscriber session should unblock on shutdown")
            .unwrap();

        // Shutdown is not an error
        tokio_test::assert_ok!(pub_result);
        tokio_test::assert_ok!(sub_result);
    }
}
