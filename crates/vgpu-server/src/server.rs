use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info, warn};

use vgpu_core::DaemonConfig;
use vgpu_protocol::command::Command;
use vgpu_protocol::wire::{self, WireError, HEADER_SIZE};
use vgpu_protocol::ProtocolError;

use crate::binding::NativeBinding;
use crate::dispatch::{self, Reply};
use crate::native::{DriverError, NativeDriver, VulkanDriver};
use crate::session::Session;

/// Delay between retries of a failing `accept`: doubles from
/// [`AcceptBackoff::INITIAL`] up to [`AcceptBackoff::MAX`], reset by the next
/// accepted connection.
#[derive(Debug)]
pub struct AcceptBackoff {
    current: Duration,
}

impl AcceptBackoff {
    pub const INITIAL: Duration = Duration::from_millis(10);
    pub const MAX: Duration = Duration::from_secs(1);

    /// The delay to wait now; the following one is twice as long.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(Self::MAX);
        delay
    }

    pub fn reset(&mut self) {
        self.current = Self::INITIAL;
    }
}

impl Default for AcceptBackoff {
    fn default() -> Self {
        Self {
            current: Self::INITIAL,
        }
    }
}

/// Daemon-wide counters, logged when a connection ends and at shutdown.
#[derive(Debug, Default)]
pub struct DaemonStats {
    pub connections_total: AtomicU64,
    pub requests_total: AtomicU64,
    /// Replies with a negative status.
    pub errors_total: AtomicU64,
    /// Connections dropped for a framing or transport error.
    pub dropped_total: AtomicU64,
}

impl DaemonStats {
    fn log_snapshot(&self) {
        info!(
            connections_total = self.connections_total.load(Ordering::Relaxed),
            requests = self.requests_total.load(Ordering::Relaxed),
            errors = self.errors_total.load(Ordering::Relaxed),
            dropped = self.dropped_total.load(Ordering::Relaxed),
            "daemon stats"
        );
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("native driver unavailable: {0}")]
    Driver(#[from] DriverError),

    #[error("failed to bind {path}: {source}")]
    Bind {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// How a connection ended.
enum Disconnect {
    PeerClosed,
    Dropped(WireError),
}

/// The host dispatch daemon. Serves one connection at a time.
pub struct VgpuDaemon<D = VulkanDriver> {
    config: DaemonConfig,
    binding: NativeBinding<D>,
    next_connection_id: u64,
    stats: Arc<DaemonStats>,
}

impl VgpuDaemon<VulkanDriver> {
    /// Load the native driver named by the config. Nothing is bound yet, so a
    /// daemon that cannot reach its driver never creates its socket.
    pub fn load(config: DaemonConfig) -> Result<Self, DaemonError> {
        let driver = VulkanDriver::load(&config.driver_library)?;
        Ok(Self::with_driver(config, driver))
    }
}

impl<D: NativeDriver> VgpuDaemon<D> {
    pub fn with_driver(config: DaemonConfig, driver: D) -> Self {
        let binding = NativeBinding::from_config(driver, &config);
        Self {
            config,
            binding,
            next_connection_id: 1,
            stats: Arc::new(DaemonStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<DaemonStats> {
        self.stats.clone()
    }

    pub fn binding(&self) -> &NativeBinding<D> {
        &self.binding
    }

    /// Remove a stale socket file and bind the listening socket.
    pub fn bind(&self) -> Result<UnixListener, DaemonError> {
        let path = &self.config.socket_path;
        if Path::new(path).exists() {
            std::fs::remove_file(path)?;
            debug!(path, "removed stale socket");
        }
        let listener = UnixListener::bind(path).map_err(|source| DaemonError::Bind {
            path: path.clone(),
            source,
        })?;
        info!("vgpu daemon listening on {}", path);
        Ok(listener)
    }

    /// Bind and serve until Ctrl-C or SIGTERM.
    pub async fn run(self) -> Result<(), DaemonError> {
        let listener = self.bind()?;
        let socket_path = self.config.socket_path.clone();

        let result = self.serve(listener, shutdown_signal()).await;

        if let Err(e) = std::fs::remove_file(&socket_path) {
            debug!("could not remove socket {}: {}", socket_path, e);
        }
        result
    }

    /// Accept and serve connections one after another until `shutdown`
    /// completes. A connection is served to completion before the next one is
    /// accepted.
    pub async fn serve<F>(mut self, listener: UnixListener, shutdown: F) -> Result<(), DaemonError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut backoff = AcceptBackoff::default();

        loop {
            let stream = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        backoff.reset();
                        stream
                    }
                    Err(e) => {
                        let delay = backoff.next_delay();
                        error!(retry_in_ms = delay.as_millis() as u64, "accept failed: {}", e);
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => continue,
                            _ = &mut shutdown => {
                                info!("shutdown signal received, stopping accept loop");
                                break;
                            }
                        }
                    }
                },
                _ = &mut shutdown => {
                    info!("shutdown signal received, stopping accept loop");
                    break;
                }
            };

            let connection_id = self.next_connection_id;
            self.next_connection_id += 1;
            self.stats.connections_total.fetch_add(1, Ordering::Relaxed);

            tokio::select! {
                _ = self.handle_connection(stream, connection_id) => {}
                _ = &mut shutdown => {
                    info!(connection = connection_id, "shutdown signal received, abandoning active connection");
                    break;
                }
            }
        }

        self.stats.log_snapshot();
        info!("daemon shut down cleanly");
        Ok(())
    }

    async fn handle_connection(&mut self, mut stream: UnixStream, connection_id: u64) {
        let mut session = Session::new(connection_id);
        info!(connection = connection_id, "client connected");

        match self.serve_requests(&mut stream, &mut session).await {
            Disconnect::PeerClosed => {
                info!(connection = connection_id, requests = session.requests(), "client disconnected");
            }
            Disconnect::Dropped(e) => {
                self.stats.dropped_total.fetch_add(1, Ordering::Relaxed);
                if e.is_framing() {
                    warn!(connection = connection_id, "closing connection on framing error: {}", e);
                } else {
                    warn!(connection = connection_id, "connection lost: {}", e);
                }
            }
        }

        if self.config.release_on_disconnect && !session.is_empty() {
            let released = self.binding.release_session(&session);
            info!(
                connection = connection_id,
                devices = released.devices,
                instances = released.instances,
                "released connection objects"
            );
        }

        self.stats.log_snapshot();
    }

    /// The per-connection read/dispatch/reply loop.
    async fn serve_requests(&mut self, stream: &mut UnixStream, session: &mut Session) -> Disconnect {
        loop {
            let header_bytes = match read_header(stream).await {
                Ok(Some(bytes)) => bytes,
                Ok(None) => return Disconnect::PeerClosed,
                Err(e) => return Disconnect::Dropped(e),
            };
            let header = match wire::decode_header(&header_bytes) {
                Ok(header) => header,
                Err(e) => return Disconnect::Dropped(e),
            };

            let reply = match Command::from_raw(header.command) {
                Some(command) => {
                    if let Err(e) = wire::check_request_size(command, header.payload_size) {
                        return Disconnect::Dropped(e);
                    }
                    let payload = match read_payload(stream, header.payload_size).await {
                        Ok(payload) => payload,
                        Err(e) => return Disconnect::Dropped(e),
                    };
                    match dispatch::dispatch(&mut self.binding, session, command, &payload) {
                        Ok(reply) => reply,
                        Err(e) => return Disconnect::Dropped(e),
                    }
                }
                None => {
                    // Drain the unknown request so the stream stays in sync.
                    if let Err(e) = read_payload(stream, header.payload_size).await {
                        return Disconnect::Dropped(e);
                    }
                    warn!(
                        connection = session.connection_id,
                        tag = header.command,
                        "unsupported command"
                    );
                    Reply::Failed(ProtocolError::UnsupportedCommand)
                }
            };

            session.record_request();
            self.stats.requests_total.fetch_add(1, Ordering::Relaxed);
            if !reply.is_ok() {
                self.stats.errors_total.fetch_add(1, Ordering::Relaxed);
            }

            if let Err(e) = stream.write_all(&reply.encode()).await {
                return Disconnect::Dropped(e.into());
            }
        }
    }
}

/// Read one request header. `Ok(None)` on a clean end of stream before the
/// first header byte.
async fn read_header(stream: &mut UnixStream) -> Result<Option<[u8; HEADER_SIZE]>, WireError> {
    let mut buf = [0u8; HEADER_SIZE];
    let mut filled = 0;
    while filled < HEADER_SIZE {
        let n = stream.read(&mut buf[filled..]).await?;
        if n == 0 {
            return if filled == 0 {
                Ok(None)
            } else {
                Err(WireError::ShortHeader(filled))
            };
        }
        filled += n;
    }
    Ok(Some(buf))
}

async fn read_payload(stream: &mut UnixStream, size: u32) -> Result<Vec<u8>, WireError> {
    let mut payload = vec![0u8; size as usize];
    stream.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = ctrl_c => { info!("received Ctrl+C, initiating shutdown"); }
                _ = sigterm.recv() => { info!("received SIGTERM, initiating shutdown"); }
            }
        }
        Err(e) => {
            warn!("failed to install SIGTERM handler: {}", e);
            if let Err(e) = ctrl_c.await {
                error!("failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            info!("received Ctrl+C, initiating shutdown");
        }
    }
}
