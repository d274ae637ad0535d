//! NativeBinding against a scripted driver (no sockets).

mod common;

use ash::vk;
use ash::vk::Handle as _;

use common::{Destroyed, MockDriver};
use vgpu_core::CoreError;
use vgpu_protocol::{Handle, ProtocolError};
use vgpu_server::session::Session;
use vgpu_server::{BindingError, NativeBinding};

fn binding(physical_devices: u32) -> (MockDriver, NativeBinding<MockDriver>) {
    let driver = MockDriver::with_physical_devices(physical_devices);
    let binding = NativeBinding::new(driver.clone(), 8, 8);
    (driver, binding)
}

#[test]
fn test_create_instance_issues_increasing_handles() {
    let (_driver, mut binding) = binding(1);
    let first = binding.create_instance().unwrap();
    let second = binding.create_instance().unwrap();

    assert_eq!(first, Handle(1));
    assert_eq!(second, Handle(2));
    assert_eq!(binding.instance_count(), 2);
}

#[test]
fn test_null_handle_resolves_to_newest_instance() {
    let (_driver, mut binding) = binding(1);
    binding.create_instance().unwrap();
    let newest = binding.create_instance().unwrap();

    let (resolved, _) = binding.resolve_instance(Handle::NULL).unwrap();
    assert_eq!(resolved, newest);
}

#[test]
fn test_null_handle_follows_creation_order_after_reuse() {
    let driver = MockDriver::with_physical_devices(1);
    let mut binding = NativeBinding::new(driver, 3, 8);

    let a = binding.create_instance().unwrap();
    binding.destroy_instance(a).unwrap();
    let b = binding.create_instance().unwrap();
    let c = binding.create_instance().unwrap();
    binding.destroy_instance(c).unwrap();
    binding.destroy_instance(b).unwrap();

    binding.create_instance().unwrap();
    binding.create_instance().unwrap();
    let latest = binding.create_instance().unwrap();

    let (resolved, _) = binding.resolve_instance(Handle::NULL).unwrap();
    assert_eq!(resolved, latest);

    let device = binding.create_device(Handle::NULL).unwrap();
    assert_eq!(binding.device_instance(device), Some(latest));
}

#[test]
fn test_no_default_instance() {
    let (_driver, binding) = binding(1);
    match binding.resolve_instance(Handle::NULL) {
        Err(BindingError::NoDefaultInstance) => {}
        other => panic!("expected NoDefaultInstance, got {:?}", other),
    }
}

#[test]
fn test_physical_device_count() {
    let (_driver, mut binding) = binding(3);
    let instance = binding.create_instance().unwrap();
    assert_eq!(binding.physical_device_count(instance).unwrap(), 3);
    assert_eq!(binding.physical_device_count(Handle::NULL).unwrap(), 3);
}

#[test]
fn test_unknown_instance_handle() {
    let (_driver, mut binding) = binding(1);
    binding.create_instance().unwrap();

    let err = binding.physical_device_count(Handle(42)).unwrap_err();
    assert_eq!(err.protocol_error(), ProtocolError::InvalidHandle);
}

#[test]
fn test_create_device_records_owning_instance() {
    let (driver, mut binding) = binding(2);
    let instance = binding.create_instance().unwrap();
    let device = binding.create_device(Handle::NULL).unwrap();

    assert_eq!(device, Handle(1));
    assert_eq!(binding.device_instance(device), Some(instance));
    assert_eq!(driver.state().devices_created, 1);
}

#[test]
fn test_create_device_without_physical_devices() {
    let (driver, mut binding) = binding(0);
    let instance = binding.create_instance().unwrap();

    let err = binding.create_device(instance).unwrap_err();
    match err {
        BindingError::NoPhysicalDevice => {}
        ref other => panic!("expected NoPhysicalDevice, got {:?}", other),
    }
    assert_eq!(err.protocol_error(), ProtocolError::NativeDriver);
    assert_eq!(driver.state().devices_created, 0);
}

#[test]
fn test_driver_failure_maps_to_native_status() {
    let (driver, mut binding) = binding(1);
    driver.state().fail_create_instance = true;

    let err = binding.create_instance().unwrap_err();
    assert_eq!(err.protocol_error(), ProtocolError::NativeDriver);
    assert_eq!(binding.instance_count(), 0);
}

#[test]
fn test_full_table_does_not_touch_driver() {
    let driver = MockDriver::with_physical_devices(1);
    let mut binding = NativeBinding::new(driver.clone(), 1, 1);
    binding.create_instance().unwrap();

    let err = binding.create_instance().unwrap_err();
    match err {
        BindingError::Table(CoreError::CapacityExceeded { kind, capacity }) => {
            assert_eq!(kind, "instance");
            assert_eq!(capacity, 1);
        }
        ref other => panic!("expected CapacityExceeded, got {:?}", other),
    }
    assert_eq!(err.protocol_error(), ProtocolError::CapacityExceeded);
    assert_eq!(driver.state().instances_created, 1);

    binding.create_device(Handle::NULL).unwrap();
    let err = binding.create_device(Handle::NULL).unwrap_err();
    assert_eq!(err.protocol_error(), ProtocolError::CapacityExceeded);
    assert_eq!(driver.state().devices_created, 1);
}

#[test]
fn test_destroyed_handles_go_stale() {
    let (driver, mut binding) = binding(1);
    let instance = binding.create_instance().unwrap();
    let device = binding.create_device(instance).unwrap();

    binding.destroy_device(device).unwrap();
    binding.destroy_instance(instance).unwrap();

    assert!(binding.destroy_device(device).is_err());
    assert_eq!(
        binding.physical_device_count(instance).unwrap_err().protocol_error(),
        ProtocolError::InvalidHandle
    );
    assert_eq!(driver.state().destroyed.len(), 2);
}

#[test]
fn test_instance_with_live_device_is_not_destroyed() {
    let (driver, mut binding) = binding(1);
    let instance = binding.create_instance().unwrap();
    binding.create_device(instance).unwrap();

    match binding.destroy_instance(instance) {
        Err(BindingError::InstanceInUse(handle)) => assert_eq!(handle, instance),
        other => panic!("expected InstanceInUse, got {:?}", other),
    }
    assert!(driver.state().destroyed.is_empty());
}

#[test]
fn test_release_session_destroys_devices_before_instances() {
    let (driver, mut binding) = binding(1);
    let mut session = Session::new(1);

    let instance = binding.create_instance().unwrap();
    session.track_instance(instance);
    let device = binding.create_device(instance).unwrap();
    session.track_device(device);

    let summary = binding.release_session(&session);
    assert_eq!(summary.devices, 1);
    assert_eq!(summary.instances, 1);

    let destroyed = driver.state().destroyed.clone();
    assert_eq!(destroyed.len(), 2);
    assert!(matches!(destroyed[0], Destroyed::Device(_)));
    assert!(matches!(destroyed[1], Destroyed::Instance(_)));
    assert_eq!(binding.instance_count(), 0);
    assert_eq!(binding.device_count(), 0);
}

#[test]
fn test_release_keeps_instance_used_by_another_session() {
    let (driver, mut binding) = binding(1);

    let mut owner = Session::new(1);
    let instance = binding.create_instance().unwrap();
    owner.track_instance(instance);

    let mut borrower = Session::new(2);
    let device = binding.create_device(instance).unwrap();
    borrower.track_device(device);

    let summary = binding.release_session(&owner);
    assert_eq!(summary.instances, 0);
    assert_eq!(binding.instance_count(), 1);

    binding.release_session(&borrower);
    assert_eq!(binding.device_count(), 0);
    assert_eq!(
        driver.state().destroyed.as_slice(),
        &[Destroyed::Device(vk::Device::from_raw(0x1002))]
    );
}
