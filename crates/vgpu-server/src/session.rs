use vgpu_protocol::Handle;

/// Per-connection state on the daemon side.
/// Tracks the handles a connection created so they can be released when it
/// closes.
#[derive(Debug)]
pub struct Session {
    pub connection_id: u64,
    instances: Vec<Handle>,
    devices: Vec<Handle>,
    requests: u64,
}

impl Session {
    pub fn new(connection_id: u64) -> Self {
        Self {
            connection_id,
            instances: Vec::new(),
            devices: Vec::new(),
            requests: 0,
        }
    }

    pub fn track_instance(&mut self, handle: Handle) {
        self.instances.push(handle);
    }

    pub fn track_device(&mut self, handle: Handle) {
        self.devices.push(handle);
    }

    /// Instances created on this connection, oldest first.
    pub fn instances(&self) -> &[Handle] {
        &self.instances
    }

    /// Devices created on this connection, oldest first.
    pub fn devices(&self) -> &[Handle] {
        &self.devices
    }

    pub fn record_request(&mut self) {
        self.requests += 1;
    }

    pub fn requests(&self) -> u64 {
        self.requests
    }

    /// Whether this connection created anything.
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty() && self.devices.is_empty()
    }
}
