//! Command dispatch: one binding operation per command tag.

use tracing::{debug, warn};

use vgpu_protocol::command::{
    Command, CreateDeviceReply, CreateInstanceReply, EnumPhysicalDevicesReply, InstanceRequest,
};
use vgpu_protocol::wire::{self, WireError};
use vgpu_protocol::{Handle, ProtocolError};

use crate::binding::NativeBinding;
use crate::native::NativeDriver;
use crate::session::Session;

/// Outcome of one request, before encoding.
pub enum Reply {
    Ok(Vec<u8>),
    Failed(ProtocolError),
}

impl Reply {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Reply::Ok(payload) => wire::encode_reply(payload),
            Reply::Failed(error) => wire::encode_error_reply(*error),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Reply::Ok(_))
    }
}

/// Execute a size-checked request against the binding.
///
/// Binding failures become negative-status replies. An `Err` means the
/// payload could not be decoded and the connection must be dropped.
pub fn dispatch<D: NativeDriver>(
    binding: &mut NativeBinding<D>,
    session: &mut Session,
    command: Command,
    payload: &[u8],
) -> Result<Reply, WireError> {
    let result = match command {
        Command::Ping => Ok(Vec::new()),
        Command::CreateInstance => binding.create_instance().map(|instance| {
            session.track_instance(instance);
            bytemuck::bytes_of(&CreateInstanceReply { instance }).to_vec()
        }),
        Command::EnumPhysicalDevices => {
            let instance = instance_arg(payload)?;
            binding.physical_device_count(instance).map(|count| {
                bytemuck::bytes_of(&EnumPhysicalDevicesReply { count, reserved: 0 }).to_vec()
            })
        }
        Command::CreateDevice => {
            let instance = instance_arg(payload)?;
            binding.create_device(instance).map(|device| {
                session.track_device(device);
                bytemuck::bytes_of(&CreateDeviceReply { device }).to_vec()
            })
        }
    };

    Ok(match result {
        Ok(payload) => {
            debug!(
                connection = session.connection_id,
                command = command.name(),
                "request served"
            );
            Reply::Ok(payload)
        }
        Err(e) => {
            warn!(
                connection = session.connection_id,
                command = command.name(),
                "request failed: {}",
                e
            );
            Reply::Failed(e.protocol_error())
        }
    })
}

/// Instance argument of a request; an empty payload names the default
/// instance.
fn instance_arg(payload: &[u8]) -> Result<Handle, WireError> {
    if payload.is_empty() {
        return Ok(Handle::NULL);
    }
    wire::decode_payload::<InstanceRequest>(payload).map(|request| request.instance)
}
