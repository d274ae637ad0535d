use vgpu_protocol::wire::WireError;
use vgpu_protocol::ProtocolError;

#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    #[error("failed to connect to vgpu daemon at {path}: {source}")]
    Connect {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IPC transport error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed reply: {0}")]
    Wire(#[from] WireError),

    #[error("daemon rejected request: {0}")]
    Rejected(#[from] ProtocolError),
}

impl IpcError {
    /// Whether the connection itself failed, as opposed to the daemon
    /// answering with a negative status.
    pub fn is_transport(&self) -> bool {
        !matches!(self, IpcError::Rejected(_))
    }
}
