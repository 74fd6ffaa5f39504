//! # Endpoint Integration Tests
//!
//! Runs the EndpointServer on a Unix socket in a temp dir and drives it with
//! EndpointClient: connect/disconnect lifecycle, both call surfaces, framing
//! errors and shutdown.

use bytes::{Bytes, BytesMut};
use prioq_core::{IdentityMode, PqError, QueueInfo, QueueService, ServiceBuilder, WriteMode};
use prioq_transport::command::{GET_INFO, SET_CAPACITY};
use prioq_transport::wire::{Request, Response, REQUEST_HEADER_LEN};
use prioq_transport::{ClientError, EndpointClient, EndpointServer};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

struct Harness {
    dir: tempfile::TempDir,
    endpoint: PathBuf,
    service: Arc<QueueService>,
    stop: oneshot::Sender<()>,
    task: JoinHandle<io::Result<()>>,
}

impl Harness {
    fn start(builder: ServiceBuilder) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = dir.path().join("prioq.sock");
        let service = builder.with_endpoint(&endpoint).start();
        let server = EndpointServer::bind(service.clone()).unwrap();

        let (stop, stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(server.run_until(async {
            let _ = stop_rx.await;
        }));
        Self {
            dir,
            endpoint,
            service,
            stop,
            task,
        }
    }

    async fn client(&self) -> EndpointClient {
        EndpointClient::connect(&self.endpoint).await.unwrap()
    }

    /// Waits until the server has released sessions down to `n`.
    async fn settle(&self, n: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.service.sessions().len() != n {
            assert!(Instant::now() < deadline, "sessions never settled at {}", n);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Stops the server and hands back the temp dir so the caller can inspect it.
    async fn shutdown(self) -> tempfile::TempDir {
        let _ = self.stop.send(());
        self.task.await.unwrap().unwrap();
        self.dir
    }
}

fn per_connection() -> ServiceBuilder {
    ServiceBuilder::new().with_identity(IdentityMode::Connection)
}

fn service_error(result: Result<impl std::fmt::Debug, ClientError>) -> PqError {
    match result {
        Err(ClientError::Service(e)) => e,
        other => panic!("expected a service error, got {:?}", other),
    }
}

/// Verifies the structured surface end to end over the socket.
#[tokio::test]
async fn test_structured_commands_over_socket() {
    let t = Instant::now();

    let h = Harness::start(per_connection());
    let mut c = h.client().await;

    assert_eq!(service_error(c.insert(1, 1).await), PqError::QueueUninitialized);
    c.set_capacity(100).await.unwrap();
    for (v, p) in [(1, 2), (2, 1), (-2, 3), (-4, 5), (90, 10), (34, 32), (34, 1)] {
        c.insert(v, p).await.unwrap();
    }
    assert_eq!(c.get_info().await.unwrap(), QueueInfo { count: 7, capacity: 100 });

    let mut out = Vec::new();
    for _ in 0..5 {
        out.push(c.get_min().await.unwrap());
    }
    assert_eq!(out, vec![2, 34, 1, -2, -4]);

    drop(c);
    h.settle(0).await;
    h.shutdown().await;

    let overhead = t.elapsed();
    println!("test_structured_commands_over_socket: Testing Overhead = {:?}", overhead);
}

/// Verifies the byte-stream surface over the socket.
#[tokio::test]
async fn test_byte_stream_over_socket() {
    let h = Harness::start(per_connection());
    let mut c = h.client().await;

    c.write_capacity(3).await.unwrap();
    c.write_pair(10, 5).await.unwrap();
    c.write_pair(11, 5).await.unwrap();
    c.write_pair(12, 5).await.unwrap();
    assert_eq!(service_error(c.write_pair(13, 5).await), PqError::CapacityExceeded);

    assert_eq!(c.pop().await.unwrap(), 10);
    assert_eq!(c.pop().await.unwrap(), 11);
    assert_eq!(c.pop().await.unwrap(), 12);
    assert_eq!(service_error(c.pop().await), PqError::Empty);

    assert!(matches!(
        service_error(c.read(8).await),
        PqError::InvalidArgument(_)
    ));

    h.shutdown().await;
}

/// Verifies the paired write layout over the socket.
#[tokio::test]
async fn test_paired_write_mode_over_socket() {
    let h = Harness::start(per_connection().with_write_mode(WriteMode::Paired));
    let mut c = h.client().await;

    c.write_capacity(2).await.unwrap();
    let mut pair = [0u8; 8];
    pair[..4].copy_from_slice(&7i32.to_ne_bytes());
    pair[4..].copy_from_slice(&0i32.to_ne_bytes());
    assert_eq!(c.write(&pair).await.unwrap(), 8);
    assert_eq!(c.pop().await.unwrap(), 7);

    h.shutdown().await;
}

/// Verifies separate connections get separate queues.
#[tokio::test]
async fn test_connections_are_isolated() {
    let h = Harness::start(per_connection());
    let mut a = h.client().await;
    let mut b = h.client().await;

    a.set_capacity(2).await.unwrap();
    b.set_capacity(2).await.unwrap();
    a.insert(1, 1).await.unwrap();
    b.insert(2, 1).await.unwrap();

    assert_eq!(a.get_min().await.unwrap(), 1);
    assert_eq!(b.get_min().await.unwrap(), 2);
    assert_eq!(h.service.sessions().len(), 2);

    drop(a);
    h.settle(1).await;
    assert_eq!(b.get_info().await.unwrap(), QueueInfo { count: 0, capacity: 2 });

    h.shutdown().await;
}

/// Verifies one process may hold only one session when identity is the peer pid.
#[tokio::test]
async fn test_pid_identity_refuses_second_connection() {
    let h = Harness::start(ServiceBuilder::new().with_identity(IdentityMode::Pid));
    let mut first = h.client().await;
    first.set_capacity(4).await.unwrap();
    h.settle(1).await;

    let mut second = h.client().await;
    assert_eq!(service_error(second.get_info().await), PqError::AlreadyAttached);
    assert!(second.get_info().await.is_err(), "a refused connection is closed");

    assert_eq!(first.get_info().await.unwrap(), QueueInfo { count: 0, capacity: 4 });

    drop(first);
    h.settle(0).await;
    let mut again = h.client().await;
    assert_eq!(
        service_error(again.get_info().await),
        PqError::QueueUninitialized,
        "reconnecting yields a fresh session"
    );

    h.shutdown().await;
}

/// Verifies a same-process reconnect right after a drop gets a fresh session.
#[tokio::test]
async fn test_pid_identity_reconnect_after_drop() {
    let t = Instant::now();

    let h = Harness::start(ServiceBuilder::new().with_identity(IdentityMode::Pid));
    let mut refused = 0;
    for _ in 0..50 {
        let mut c = h.client().await;
        match c.set_capacity(2).await {
            Ok(()) => {}
            Err(ClientError::Service(PqError::AlreadyAttached)) => refused += 1,
            Err(e) => panic!("unexpected {:?}", e),
        }
        drop(c);

        let mut again = h.client().await;
        match again.get_info().await {
            Err(ClientError::Service(PqError::QueueUninitialized)) => {}
            Err(ClientError::Service(PqError::AlreadyAttached)) => refused += 1,
            other => panic!("unexpected {:?}", other),
        }
        drop(again);
    }
    assert_eq!(refused, 0, "reconnects refused while the previous session was released");

    h.shutdown().await;

    let overhead = t.elapsed();
    println!("test_pid_identity_reconnect_after_drop: Testing Overhead = {:?}", overhead);
}

/// Verifies close returns only after the session is released.
#[tokio::test]
async fn test_close_releases_session_before_returning() {
    let mut builder = ServiceBuilder::new().with_identity(IdentityMode::Pid);
    builder.config.attach_grace_ms = 0;
    let h = Harness::start(builder);

    for _ in 0..20 {
        let mut c = h.client().await;
        c.set_capacity(3).await.unwrap();
        c.insert(1, 1).await.unwrap();
        c.close().await.unwrap();
        assert!(h.service.sessions().is_empty());

        let mut again = h.client().await;
        assert_eq!(service_error(again.get_info().await), PqError::QueueUninitialized);
        again.close().await.unwrap();
    }

    h.shutdown().await;
}

/// Verifies raw command buffers, including a short out-argument.
#[tokio::test]
async fn test_raw_ioctl_over_socket() {
    let h = Harness::start(per_connection());
    let mut c = h.client().await;

    c.ioctl(SET_CAPACITY, &5i32.to_ne_bytes()).await.unwrap();
    let info = c.ioctl(GET_INFO, &[0u8; 8]).await.unwrap();
    assert_eq!(info.len(), 8);
    assert_eq!(
        QueueInfo::from_ne_bytes(info[..].try_into().unwrap()),
        QueueInfo { count: 0, capacity: 5 }
    );

    assert_eq!(service_error(c.ioctl(GET_INFO, &[0u8; 4]).await), PqError::TransferFailed);
    assert!(matches!(
        service_error(c.ioctl(0x1234, &[]).await),
        PqError::InvalidArgument(_)
    ));

    h.shutdown().await;
}

/// Verifies an oversized frame is answered with an error and the connection closed.
#[tokio::test]
async fn test_oversized_frame_closes_connection() {
    let h = Harness::start(per_connection());
    let max = h.service.config().max_payload;
    let mut c = h.client().await;

    let big = vec![0u8; max + 1];
    assert!(matches!(service_error(c.write(&big).await), PqError::InvalidArgument(_)));
    assert!(c.get_info().await.is_err());

    h.settle(0).await;
    h.shutdown().await;
}

/// Verifies an unknown op is rejected and the connection keeps working.
#[tokio::test]
async fn test_unknown_op_keeps_connection() {
    let h = Harness::start(per_connection());
    let mut stream = UnixStream::connect(&h.endpoint).await.unwrap();

    let mut out = BytesMut::new();
    Request::Unknown { op: 0x7f }.encode(&mut out);
    Request::Write(Bytes::from_static(&[2u8])).encode(&mut out);
    assert_eq!(out.len(), 2 * REQUEST_HEADER_LEN + 1);
    stream.write_all_buf(&mut out).await.unwrap();

    let mut inbound = BytesMut::new();
    let mut responses = Vec::new();
    while responses.len() < 2 {
        match Response::decode(&mut inbound, 64).unwrap() {
            Some(resp) => responses.push(resp),
            None => assert!(stream.read_buf(&mut inbound).await.unwrap() > 0),
        }
    }

    assert!(matches!(
        responses[0].clone().into_result(),
        Err(Some(PqError::InvalidArgument(_)))
    ));
    assert_eq!(responses[1].clone().into_result().unwrap().0, 1);

    h.shutdown().await;
}

/// Verifies shutdown releases every session and removes the endpoint.
#[tokio::test]
async fn test_shutdown_releases_sessions_and_endpoint() {
    let h = Harness::start(per_connection());
    let mut a = h.client().await;
    let mut b = h.client().await;
    a.set_capacity(1).await.unwrap();
    b.set_capacity(1).await.unwrap();

    let endpoint = h.endpoint.clone();
    let service = h.service.clone();

    let dir = h.shutdown().await;

    assert!(dir.path().exists());
    assert!(!endpoint.exists(), "endpoint must be removed on shutdown");
    assert!(service.is_stopped());
    assert!(service.sessions().is_empty());
    assert!(a.get_info().await.is_err());
    drop(b);
}

/// Verifies binding over a stale endpoint file replaces it.
#[tokio::test]
async fn test_bind_replaces_stale_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let endpoint = dir.path().join("prioq.sock");
    std::fs::write(&endpoint, b"stale").unwrap();

    let service = per_connection().with_endpoint(&endpoint).start();
    let server = EndpointServer::bind(service).unwrap();
    assert_eq!(server.local_path(), endpoint.as_path());

    let (stop, stop_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(server.run_until(async {
        let _ = stop_rx.await;
    }));

    let mut c = EndpointClient::connect(&endpoint).await.unwrap();
    c.set_capacity(1).await.unwrap();

    let _ = stop.send(());
    task.await.unwrap().unwrap();
}
