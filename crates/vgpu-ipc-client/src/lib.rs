//! Synchronous IPC client for the vgpu daemon.
//!
//! One connection per client, opened lazily on the first request. The lock
//! is held for the whole round trip, so concurrent callers are serialized and
//! never interleave partial frames. There are no retries: a failed round trip
//! fails its call, and the [`ReconnectPolicy`] only decides what the next
//! call starts from.

pub mod error;

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use vgpu_common::platform;
use vgpu_core::{GuestConfig, ReconnectPolicy};
use vgpu_protocol::command::{
    Command, CreateDeviceReply, CreateInstanceReply, EnumPhysicalDevicesReply, InstanceRequest,
};
use vgpu_protocol::wire::{self, ReplyHeader, REPLY_HEADER_SIZE};
use vgpu_protocol::{Handle, ProtocolError};

pub use error::IpcError;

/// State of the client's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionHealth {
    /// No round trip attempted yet.
    Disconnected,
    /// The last round trip completed.
    Healthy,
    /// The last connect or round trip hit a transport error.
    Failed,
}

struct Connection {
    stream: Option<UnixStream>,
    health: ConnectionHealth,
}

pub struct IpcClient {
    path: String,
    policy: ReconnectPolicy,
    read_timeout: Option<Duration>,
    connection: Mutex<Connection>,
}

impl IpcClient {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            policy: ReconnectPolicy::default(),
            read_timeout: None,
            connection: Mutex::new(Connection {
                stream: None,
                health: ConnectionHealth::Disconnected,
            }),
        }
    }

    /// Build a client from guest configuration. `VGPU_SOCKET` overrides the
    /// configured socket path.
    pub fn from_config(config: &GuestConfig) -> Self {
        Self::new(platform::guest_socket_path(&config.socket_path))
            .with_policy(config.reconnect)
            .with_read_timeout(config.read_timeout_ms.map(Duration::from_millis))
    }

    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// A zero timeout is treated as none.
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    pub fn health(&self) -> ConnectionHealth {
        self.connection.lock().health
    }

    /// Send one request and return the payload of a successful reply.
    pub fn request(&self, command: Command, payload: &[u8]) -> Result<Vec<u8>, IpcError> {
        let (header, payload) = self.round_trip(command, payload)?;
        ProtocolError::from_status(header.status)?;
        Ok(payload)
    }

    pub fn ping(&self) -> Result<(), IpcError> {
        self.request(Command::Ping, &[]).map(|_| ())
    }

    pub fn create_instance(&self) -> Result<Handle, IpcError> {
        let reply = self.request(Command::CreateInstance, &[])?;
        Ok(wire::decode_payload::<CreateInstanceReply>(&reply)?.instance)
    }

    /// Number of physical devices behind a host instance.
    pub fn enumerate_physical_devices(&self, instance: Handle) -> Result<u32, IpcError> {
        let request = InstanceRequest { instance };
        let reply = self.request(Command::EnumPhysicalDevices, bytemuck::bytes_of(&request))?;
        Ok(wire::decode_payload::<EnumPhysicalDevicesReply>(&reply)?.count)
    }

    /// Create a device on a host instance. [`Handle::NULL`] selects the
    /// daemon's default instance.
    pub fn create_device(&self, instance: Handle) -> Result<Handle, IpcError> {
        let request = InstanceRequest { instance };
        let reply = self.request(Command::CreateDevice, bytemuck::bytes_of(&request))?;
        Ok(wire::decode_payload::<CreateDeviceReply>(&reply)?.device)
    }

    fn round_trip(
        &self,
        command: Command,
        payload: &[u8],
    ) -> Result<(ReplyHeader, Vec<u8>), IpcError> {
        let frame = wire::encode_request(command, payload);

        let mut guard = self.connection.lock();
        let conn = &mut *guard;

        let stream = match conn.stream {
            Some(ref mut stream) => stream,
            None => match self.connect() {
                Ok(stream) => conn.stream.insert(stream),
                Err(e) => {
                    conn.health = ConnectionHealth::Failed;
                    return Err(e);
                }
            },
        };

        match exchange(stream, command, &frame) {
            Ok(reply) => {
                conn.health = ConnectionHealth::Healthy;
                debug!(
                    command = command.name(),
                    status = reply.0.status,
                    "round trip complete"
                );
                Ok(reply)
            }
            Err(e) => {
                conn.health = ConnectionHealth::Failed;
                if self.policy == ReconnectPolicy::Reconnect {
                    conn.stream = None;
                }
                warn!(command = command.name(), policy = ?self.policy, "round trip failed: {}", e);
                Err(e)
            }
        }
    }

    fn connect(&self) -> Result<UnixStream, IpcError> {
        let stream = UnixStream::connect(&self.path).map_err(|source| IpcError::Connect {
            path: self.path.clone(),
            source,
        })?;
        stream.set_read_timeout(self.read_timeout)?;
        debug!(path = %self.path, "connected to vgpu daemon");
        Ok(stream)
    }
}

/// Write one request frame and read its reply. The declared reply size is
/// checked against the command before any payload byte is read.
fn exchange(
    stream: &mut UnixStream,
    command: Command,
    frame: &[u8],
) -> Result<(ReplyHeader, Vec<u8>), IpcError> {
    stream.write_all(frame)?;

    let mut header = [0u8; REPLY_HEADER_SIZE];
    stream.read_exact(&mut header)?;
    let header = wire::decode_reply_header(&header)?;
    wire::check_reply_size(command, &header)?;

    let mut payload = vec![0u8; header.payload_size as usize];
    stream.read_exact(&mut payload)?;
    Ok((header, payload))
}
