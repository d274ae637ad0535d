use std::mem::size_of;

use bytemuck::{Pod, Zeroable};

use crate::handle::Handle;

/// Command tags carried in `MessageHeader::command`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Command {
    Ping = 1,
    CreateInstance = 2,
    EnumPhysicalDevices = 3,
    CreateDevice = 4,
}

impl Command {
    pub const ALL: [Command; 4] = [
        Command::Ping,
        Command::CreateInstance,
        Command::EnumPhysicalDevices,
        Command::CreateDevice,
    ];

    /// Map a raw tag to a known command. Unknown tags are not a framing error;
    /// the daemon answers them with an "unsupported" reply.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(Command::Ping),
            2 => Some(Command::CreateInstance),
            3 => Some(Command::EnumPhysicalDevices),
            4 => Some(Command::CreateDevice),
            _ => None,
        }
    }

    pub fn as_raw(self) -> u32 {
        self as u32
    }

    /// Request payload sizes the receiver accepts for this command.
    pub fn request_payload_sizes(self) -> &'static [u32] {
        const NONE: &[u32] = &[0];
        const INSTANCE: &[u32] = &[size_of::<InstanceRequest>() as u32];
        // The instance handle is optional; an empty request targets the
        // default instance.
        const OPTIONAL_INSTANCE: &[u32] = &[0, size_of::<InstanceRequest>() as u32];

        match self {
            Command::Ping | Command::CreateInstance => NONE,
            Command::EnumPhysicalDevices => OPTIONAL_INSTANCE,
            Command::CreateDevice => INSTANCE,
        }
    }

    pub fn accepts_request_size(self, declared: u32) -> bool {
        self.request_payload_sizes().contains(&declared)
    }

    /// Exact payload size of a successful reply.
    pub fn reply_payload_size(self) -> u32 {
        match self {
            Command::Ping => 0,
            Command::CreateInstance => size_of::<CreateInstanceReply>() as u32,
            Command::EnumPhysicalDevices => size_of::<EnumPhysicalDevicesReply>() as u32,
            Command::CreateDevice => size_of::<CreateDeviceReply>() as u32,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::Ping => "PING",
            Command::CreateInstance => "CREATE_INSTANCE",
            Command::EnumPhysicalDevices => "ENUM_PHYSICAL_DEVICES",
            Command::CreateDevice => "CREATE_DEVICE",
        }
    }
}

// ── Payloads ────────────────────────────────────────────────
//
// One canonical struct per payload, shared by guest and daemon. Native byte
// order; both ends must run on the same architecture.

/// Request payload naming a host instance. Used by `ENUM_PHYSICAL_DEVICES`
/// (optional) and `CREATE_DEVICE`. A null handle selects the default instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct InstanceRequest {
    pub instance: Handle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct CreateInstanceReply {
    pub instance: Handle,
}

/// Only the number of host physical devices crosses the wire, never their
/// identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct EnumPhysicalDevicesReply {
    pub count: u32,
    pub reserved: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct CreateDeviceReply {
    pub device: Handle,
}
