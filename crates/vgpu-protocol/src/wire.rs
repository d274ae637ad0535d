use std::mem::size_of;

use bytemuck::{Pod, Zeroable};

use crate::command::Command;
use crate::error::ProtocolError;

/// Wire protocol magic: "PKVV" in little-endian memory order.
pub const MAGIC: u32 = 0x5656_4b50;

/// Request header size in bytes: magic(4) + command(4) + payload_size(4) + reserved(4) = 16
pub const HEADER_SIZE: usize = size_of::<MessageHeader>();

/// Reply header size in bytes: status(4) + payload_size(4) = 8
pub const REPLY_HEADER_SIZE: usize = size_of::<ReplyHeader>();

/// Upper bound on any declared payload. Larger declarations are a framing
/// error; the receiver never allocates for them.
pub const MAX_PAYLOAD_SIZE: u32 = 4096;

/// Request frame header. Native byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct MessageHeader {
    pub magic: u32,
    pub command: u32,
    pub payload_size: u32,
    pub reserved: u32,
}

impl MessageHeader {
    pub fn new(command: u32, payload_size: u32) -> Self {
        Self {
            magic: MAGIC,
            command,
            payload_size,
            reserved: 0,
        }
    }
}

/// Reply frame header. Native byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct ReplyHeader {
    pub status: i32,
    pub payload_size: u32,
}

/// Encode a request frame (header + payload).
pub fn encode_request(command: Command, payload: &[u8]) -> Vec<u8> {
    encode_raw_request(command.as_raw(), payload)
}

/// Encode a request frame with an arbitrary command tag.
pub fn encode_raw_request(command: u32, payload: &[u8]) -> Vec<u8> {
    let header = MessageHeader::new(command, payload.len() as u32);
    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(bytemuck::bytes_of(&header));
    frame.extend_from_slice(payload);
    frame
}

/// Encode a successful reply frame.
pub fn encode_reply(payload: &[u8]) -> Vec<u8> {
    let header = ReplyHeader {
        status: crate::error::STATUS_OK,
        payload_size: payload.len() as u32,
    };
    let mut frame = Vec::with_capacity(REPLY_HEADER_SIZE + payload.len());
    frame.extend_from_slice(bytemuck::bytes_of(&header));
    frame.extend_from_slice(payload);
    frame
}

/// Encode a failure reply: negative status, zero-length payload.
pub fn encode_error_reply(error: ProtocolError) -> Vec<u8> {
    let header = ReplyHeader {
        status: error.status(),
        payload_size: 0,
    };
    bytemuck::bytes_of(&header).to_vec()
}

/// Decode a request header. The magic is checked before any other field is
/// looked at, and the declared size is bounded.
pub fn decode_header(bytes: &[u8; HEADER_SIZE]) -> Result<MessageHeader, WireError> {
    let header: MessageHeader = bytemuck::pod_read_unaligned(bytes);
    if header.magic != MAGIC {
        return Err(WireError::InvalidMagic(header.magic));
    }
    if header.payload_size > MAX_PAYLOAD_SIZE {
        return Err(WireError::PayloadTooLarge(header.payload_size));
    }
    Ok(header)
}

/// Decode a reply header, bounding the declared payload size.
pub fn decode_reply_header(bytes: &[u8; REPLY_HEADER_SIZE]) -> Result<ReplyHeader, WireError> {
    let header: ReplyHeader = bytemuck::pod_read_unaligned(bytes);
    if header.payload_size > MAX_PAYLOAD_SIZE {
        return Err(WireError::PayloadTooLarge(header.payload_size));
    }
    Ok(header)
}

/// Check a request's declared payload size against what its command accepts.
pub fn check_request_size(command: Command, declared: u32) -> Result<(), WireError> {
    if command.accepts_request_size(declared) {
        Ok(())
    } else {
        Err(WireError::PayloadSizeMismatch {
            command: command.name(),
            expected: command.request_payload_sizes().iter().copied().max().unwrap_or(0),
            actual: declared,
        })
    }
}

/// Check a reply's declared payload size. Successful replies must carry
/// exactly the command's reply payload; failures carry none.
pub fn check_reply_size(command: Command, header: &ReplyHeader) -> Result<(), WireError> {
    let expected = if header.status == crate::error::STATUS_OK {
        command.reply_payload_size()
    } else {
        0
    };
    if header.payload_size == expected {
        Ok(())
    } else {
        Err(WireError::PayloadSizeMismatch {
            command: command.name(),
            expected,
            actual: header.payload_size,
        })
    }
}

/// Reinterpret an exactly-sized payload as its fixed-layout struct.
pub fn decode_payload<T: Pod>(bytes: &[u8]) -> Result<T, WireError> {
    if bytes.len() != size_of::<T>() {
        return Err(WireError::PayloadSizeMismatch {
            command: std::any::type_name::<T>(),
            expected: size_of::<T>() as u32,
            actual: bytes.len() as u32,
        });
    }
    Ok(bytemuck::pod_read_unaligned(bytes))
}

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("invalid magic: {0:#x}")]
    InvalidMagic(u32),
    #[error("short header: got {0} bytes")]
    ShortHeader(usize),
    #[error("payload size mismatch for {command}: expected {expected}, got {actual}")]
    PayloadSizeMismatch {
        command: &'static str,
        expected: u32,
        actual: u32,
    },
    #[error("declared payload too large: {0} bytes")]
    PayloadTooLarge(u32),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WireError {
    /// Framing errors mean the peer violated the protocol; anything else is a
    /// transport failure.
    pub fn is_framing(&self) -> bool {
        !matches!(self, WireError::Io(_))
    }
}
