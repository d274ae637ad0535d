//! Framing rules shared by the guest shim and the daemon.

use vgpu_protocol::command::{
    Command, CreateDeviceReply, CreateInstanceReply, EnumPhysicalDevicesReply, InstanceRequest,
};
use vgpu_protocol::wire::{self, MessageHeader, ReplyHeader, WireError, HEADER_SIZE, MAGIC};
use vgpu_protocol::{Handle, ProtocolError};

fn header_bytes(header: MessageHeader) -> [u8; HEADER_SIZE] {
    let mut buf = [0u8; HEADER_SIZE];
    buf.copy_from_slice(bytemuck::bytes_of(&header));
    buf
}

#[test]
fn test_header_layout() {
    assert_eq!(wire::HEADER_SIZE, 16);
    assert_eq!(wire::REPLY_HEADER_SIZE, 8);
    assert_eq!(std::mem::size_of::<InstanceRequest>(), 8);
    assert_eq!(std::mem::size_of::<EnumPhysicalDevicesReply>(), 8);
}

#[test]
fn test_request_frame_starts_with_native_order_magic() {
    let req = InstanceRequest {
        instance: Handle(7),
    };
    let frame = wire::encode_request(Command::CreateDevice, bytemuck::bytes_of(&req));

    assert_eq!(frame.len(), HEADER_SIZE + 8);
    assert_eq!(&frame[0..4], &MAGIC.to_ne_bytes());
    assert_eq!(&frame[4..8], &4u32.to_ne_bytes());
    assert_eq!(&frame[8..12], &8u32.to_ne_bytes());
    assert_eq!(&frame[12..16], &0u32.to_ne_bytes());
    assert_eq!(&frame[16..24], &7u64.to_ne_bytes());
}

#[test]
fn test_decode_header_rejects_bad_magic() {
    let mut header = MessageHeader::new(Command::Ping.as_raw(), 0);
    header.magic = 0xdead_beef;

    match wire::decode_header(&header_bytes(header)) {
        Err(WireError::InvalidMagic(magic)) => assert_eq!(magic, 0xdead_beef),
        other => panic!("expected InvalidMagic, got {:?}", other),
    }
}

#[test]
fn test_decode_header_bounds_payload_size() {
    let header = MessageHeader::new(99, wire::MAX_PAYLOAD_SIZE + 1);
    assert!(matches!(
        wire::decode_header(&header_bytes(header)),
        Err(WireError::PayloadTooLarge(_))
    ));
}

#[test]
fn test_unknown_tag_is_not_a_framing_error() {
    let header = MessageHeader::new(42, 0);
    let decoded = wire::decode_header(&header_bytes(header)).expect("valid framing");
    assert_eq!(Command::from_raw(decoded.command), None);
}

#[test]
fn test_request_size_rules() {
    assert!(wire::check_request_size(Command::Ping, 0).is_ok());
    assert!(wire::check_request_size(Command::Ping, 8).is_err());
    assert!(wire::check_request_size(Command::CreateInstance, 0).is_ok());
    assert!(wire::check_request_size(Command::EnumPhysicalDevices, 0).is_ok());
    assert!(wire::check_request_size(Command::EnumPhysicalDevices, 8).is_ok());
    assert!(wire::check_request_size(Command::EnumPhysicalDevices, 4).is_err());
    assert!(wire::check_request_size(Command::CreateDevice, 8).is_ok());

    match wire::check_request_size(Command::CreateDevice, 0) {
        Err(WireError::PayloadSizeMismatch {
            expected, actual, ..
        }) => {
            assert_eq!(expected, 8);
            assert_eq!(actual, 0);
        }
        other => panic!("expected PayloadSizeMismatch, got {:?}", other),
    }
}

#[test]
fn test_reply_sizes() {
    assert_eq!(Command::Ping.reply_payload_size(), 0);
    assert_eq!(
        Command::CreateInstance.reply_payload_size() as usize,
        std::mem::size_of::<CreateInstanceReply>()
    );
    assert_eq!(
        Command::CreateDevice.reply_payload_size() as usize,
        std::mem::size_of::<CreateDeviceReply>()
    );

    let ok = ReplyHeader {
        status: 0,
        payload_size: 8,
    };
    assert!(wire::check_reply_size(Command::CreateInstance, &ok).is_ok());
    assert!(wire::check_reply_size(Command::Ping, &ok).is_err());

    let failed = ReplyHeader {
        status: -2,
        payload_size: 0,
    };
    assert!(wire::check_reply_size(Command::CreateInstance, &failed).is_ok());
}

#[test]
fn test_error_reply_has_empty_payload() {
    let frame = wire::encode_error_reply(ProtocolError::UnsupportedCommand);
    assert_eq!(frame.len(), wire::REPLY_HEADER_SIZE);

    let mut buf = [0u8; wire::REPLY_HEADER_SIZE];
    buf.copy_from_slice(&frame);
    let header = wire::decode_reply_header(&buf).expect("valid reply header");
    assert_eq!(header.status, -1);
    assert_eq!(header.payload_size, 0);
}

#[test]
fn test_decode_payload_requires_exact_size() {
    let reply = EnumPhysicalDevicesReply {
        count: 2,
        reserved: 0,
    };
    let bytes = bytemuck::bytes_of(&reply);

    let decoded: EnumPhysicalDevicesReply = wire::decode_payload(bytes).expect("exact size");
    assert_eq!(decoded.count, 2);

    assert!(wire::decode_payload::<EnumPhysicalDevicesReply>(&bytes[..4]).is_err());
}

#[test]
fn test_status_codes() {
    assert_eq!(ProtocolError::from_status(0), Ok(()));
    for err in [
        ProtocolError::UnsupportedCommand,
        ProtocolError::NativeDriver,
        ProtocolError::InvalidHandle,
        ProtocolError::CapacityExceeded,
    ] {
        assert!(err.status() < 0);
        assert_eq!(ProtocolError::from_status(err.status()), Err(err));
    }
    assert_eq!(
        ProtocolError::from_status(-77),
        Err(ProtocolError::Unknown(-77))
    );
}
