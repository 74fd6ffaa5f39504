use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use prioq_core::{ClientId, IdentityMode, PqError, QueueService};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::Notify;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::dispatcher::Dispatcher;
use crate::wire::{FrameError, Request, Response, REQUEST_HEADER_LEN};

/// Hosts the service at its well-known endpoint, a Unix domain socket.
///
/// Each accepted connection is one client: accepting it connects the client,
/// and EOF disconnects it. Requests on a connection are handled strictly in
/// order, one at a time.
///
/// A peer may close its connection and reopen the endpoint before the old
/// connection's EOF has been read. A connect that finds its identity still
/// attached therefore waits up to `attach_grace_ms` for that session to be
/// released before it is refused.
pub struct EndpointServer {
    listener: UnixListener,
    path: PathBuf,
    dispatcher: Arc<Dispatcher>,
    released: Arc<Notify>,
}

impl EndpointServer {
    /// Binds the endpoint named by the service configuration, replacing a stale
    /// socket file. Must be called from within a tokio runtime.
    pub fn bind(service: Arc<QueueService>) -> io::Result<Self> {
        let path = service.config().endpoint.clone();
        if path.exists() {
            tracing::warn!("EndpointServer: removing stale endpoint {}", path.display());
            std::fs::remove_file(&path)?;
        }
        let listener = UnixListener::bind(&path)?;
        tracing::info!("EndpointServer: listening on {}", path.display());

        Ok(Self {
            listener,
            path,
            dispatcher: Arc::new(Dispatcher::new(service)),
            released: Arc::new(Notify::new()),
        })
    }

    pub fn local_path(&self) -> &Path {
        &self.path
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Serves until the process is terminated.
    pub async fn run(self) -> io::Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Serves until `shutdown` resolves, then drops every client, removes the
    /// endpoint and stops the service.
    pub async fn run_until<F>(self, shutdown: F) -> io::Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let identity = self.dispatcher.service().config().identity;
        let max_payload = self.dispatcher.service().config().max_payload;
        let grace = self.dispatcher.service().config().attach_grace();
        let mut clients = JoinSet::new();
        let mut seq: u64 = 0;

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                Some(done) = clients.join_next(), if !clients.is_empty() => {
                    if let Err(e) = done {
                        tracing::error!("EndpointServer: client task failed: {}", e);
                    }
                }
                accepted = self.listener.accept() => {
                    let stream = match accepted {
                        Ok((stream, _)) => stream,
                        Err(e) => {
                            tracing::warn!("EndpointServer: accept failed: {}", e);
                            continue;
                        }
                    };
                    seq += 1;
                    let client = identify(&stream, identity, seq);
                    let dispatcher = self.dispatcher.clone();
                    let released = self.released.clone();
                    clients.spawn(async move {
                        let conn = Connection {
                            dispatcher: &dispatcher,
                            released: &released,
                            client,
                            max_payload,
                        };
                        if let Err(e) = conn.serve(stream, grace).await {
                            tracing::warn!("EndpointServer: {} connection error: {}", client, e);
                        }
                    });
                }
            }
        }

        tracing::info!("EndpointServer: shutting down, {} client task(s) live", clients.len());
        clients.shutdown().await;
        drop(self.listener);
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!("EndpointServer: could not remove {}: {}", self.path.display(), e);
        }
        self.dispatcher.service().stop();
        Ok(())
    }
}

fn identify(stream: &UnixStream, mode: IdentityMode, seq: u64) -> ClientId {
    match mode {
        IdentityMode::Connection => ClientId::synthetic(seq),
        IdentityMode::Pid => stream
            .peer_cred()
            .ok()
            .and_then(|cred| cred.pid())
            .map(ClientId::from_pid)
            .unwrap_or_else(|| ClientId::synthetic(seq)),
    }
}

struct Connection<'a> {
    dispatcher: &'a Dispatcher,
    released: &'a Notify,
    client: ClientId,
    max_payload: usize,
}

impl Connection<'_> {
    async fn serve(&self, mut stream: UnixStream, grace: Duration) -> io::Result<()> {
        let mut outbound = BytesMut::new();

        if let Err(e) = self.attach(grace).await {
            return refuse(&mut stream, &e, self.max_payload, &mut outbound).await;
        }

        let result = pump(self.dispatcher, &mut stream, self.client, self.max_payload, &mut outbound).await;
        self.dispatcher.disconnect(self.client);
        self.released.notify_waiters();
        result
    }

    /// Connects the client, waiting out a same-identity session that is
    /// still being torn down.
    async fn attach(&self, grace: Duration) -> Result<(), PqError> {
        let deadline = Instant::now() + grace;
        loop {
            // Registered before the attempt so a release between the two is not missed.
            let released = self.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            match self.dispatcher.connect(self.client) {
                Err(PqError::AlreadyAttached) if Instant::now() < deadline => {
                    tracing::debug!("EndpointServer: {} waiting for previous session", self.client);
                    if tokio::time::timeout_at(deadline, released).await.is_err() {
                        return self.dispatcher.connect(self.client);
                    }
                }
                other => return other,
            }
        }
    }
}

async fn pump(
    dispatcher: &Dispatcher,
    stream: &mut UnixStream,
    client: ClientId,
    max_payload: usize,
    outbound: &mut BytesMut,
) -> io::Result<()> {
    let mut inbound = BytesMut::with_capacity(REQUEST_HEADER_LEN + max_payload);

    loop {
        match Request::decode(&mut inbound, max_payload) {
            Ok(Some(req)) => {
                handle(dispatcher, client, req, max_payload).encode(outbound);
                stream.write_all_buf(outbound).await?;
                continue;
            }
            Ok(None) => {}
            Err(FrameError::Oversized { len, max }) => {
                let e = PqError::invalid(format!("frame payload {} exceeds {}", len, max));
                tracing::warn!("EndpointServer: {} {}, closing", client, e);
                Response::err(&e).encode(outbound);
                stream.write_all_buf(outbound).await?;
                return Ok(());
            }
        }

        if stream.read_buf(&mut inbound).await? == 0 {
            if inbound.is_empty() {
                return Ok(());
            }
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated frame"));
        }
    }
}

/// Answers the first request of a refused client with `e`, then closes.
async fn refuse(
    stream: &mut UnixStream,
    e: &PqError,
    max_payload: usize,
    outbound: &mut BytesMut,
) -> io::Result<()> {
    let mut inbound = BytesMut::with_capacity(REQUEST_HEADER_LEN);
    loop {
        match Request::decode(&mut inbound, max_payload) {
            Ok(None) => {}
            Ok(Some(_)) | Err(_) => break,
        }
        if stream.read_buf(&mut inbound).await? == 0 {
            return Ok(());
        }
    }
    Response::err(e).encode(outbound);
    stream.write_all_buf(outbound).await
}

fn handle(dispatcher: &Dispatcher, client: ClientId, req: Request, max_payload: usize) -> Response {
    match req {
        Request::Write(payload) => match dispatcher.write(client, &payload) {
            Ok(n) => Response::ok(n, Vec::new()),
            Err(e) => Response::err(&e),
        },
        Request::Read { len } => {
            let len = len as usize;
            if len > max_payload {
                return Response::err(&PqError::invalid(format!("read of {} bytes", len)));
            }
            let mut buf = vec![0u8; len];
            match dispatcher.read(client, &mut buf) {
                Ok(n) => {
                    buf.truncate(n);
                    Response::ok(n, buf)
                }
                Err(e) => Response::err(&e),
            }
        }
        Request::Ioctl { code, arg } => {
            let mut buf = arg.to_vec();
            match dispatcher.ioctl(client, code, &mut buf) {
                Ok(status) => Response {
                    status,
                    payload: buf.into(),
                },
                Err(e) => Response::err(&e),
            }
        }
        Request::Unknown { op } => {
            tracing::warn!("EndpointServer: {} sent unknown op {}", client, op);
            Response::err(&PqError::invalid(format!("unknown op {}", op)))
        }
    }
}
