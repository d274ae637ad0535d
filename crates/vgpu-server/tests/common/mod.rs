//! Shared fixtures: a scripted native driver and a daemon running on its own
//! thread.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use ash::vk::Handle as _;
use parking_lot::{Mutex, MutexGuard};
use tempfile::TempDir;

use vgpu_core::DaemonConfig;
use vgpu_protocol::wire::{self, ReplyHeader, REPLY_HEADER_SIZE};
use vgpu_server::{DaemonStats, DriverError, NativeDriver, VgpuDaemon};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destroyed {
    Device(vk::Device),
    Instance(vk::Instance),
}

#[derive(Debug, Default)]
pub struct MockState {
    pub physical_devices: u32,
    pub fail_create_instance: bool,
    pub fail_create_device: bool,
    pub instances_created: u32,
    pub devices_created: u32,
    pub destroyed: Vec<Destroyed>,
    next_raw: u64,
}

/// Scripted driver. Native handles are fabricated from a counter starting at
/// 0x1000 so they never collide with daemon handles.
#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    pub fn with_physical_devices(count: u32) -> Self {
        let driver = Self::default();
        driver.state().physical_devices = count;
        driver
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock()
    }
}

impl MockState {
    fn next_raw(&mut self) -> u64 {
        self.next_raw += 1;
        0x1000 + self.next_raw
    }
}

impl NativeDriver for MockDriver {
    fn create_instance(&self) -> Result<vk::Instance, DriverError> {
        let mut state = self.state();
        if state.fail_create_instance {
            return Err(DriverError::Vulkan {
                call: "vkCreateInstance",
                result: vk::Result::ERROR_INCOMPATIBLE_DRIVER,
            });
        }
        state.instances_created += 1;
        Ok(vk::Instance::from_raw(state.next_raw()))
    }

    fn enumerate_physical_devices(
        &self,
        _instance: vk::Instance,
    ) -> Result<Vec<vk::PhysicalDevice>, DriverError> {
        let count = self.state().physical_devices as u64;
        Ok((1..=count)
            .map(|i| vk::PhysicalDevice::from_raw(0x9000 + i))
            .collect())
    }

    fn create_device(
        &self,
        _instance: vk::Instance,
        _physical_device: vk::PhysicalDevice,
    ) -> Result<vk::Device, DriverError> {
        let mut state = self.state();
        if state.fail_create_device {
            return Err(DriverError::Vulkan {
                call: "vkCreateDevice",
                result: vk::Result::ERROR_DEVICE_LOST,
            });
        }
        state.devices_created += 1;
        Ok(vk::Device::from_raw(state.next_raw()))
    }

    fn destroy_device(&self, _instance: vk::Instance, device: vk::Device) {
        self.state().destroyed.push(Destroyed::Device(device));
    }

    fn destroy_instance(&self, instance: vk::Instance) {
        self.state().destroyed.push(Destroyed::Instance(instance));
    }
}

pub struct TestDaemon {
    pub socket_path: PathBuf,
    pub stats: Arc<DaemonStats>,
    _dir: TempDir,
}

impl TestDaemon {
    pub fn connect(&self) -> UnixStream {
        let stream = UnixStream::connect(&self.socket_path).expect("connect to test daemon");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("set read timeout");
        stream
    }
}

/// Start a daemon on a background thread with its own current-thread runtime.
/// The socket is bound before this returns, so clients can connect at once.
pub fn start_daemon(driver: MockDriver, configure: impl FnOnce(&mut DaemonConfig)) -> TestDaemon {
    let dir = tempfile::tempdir().expect("tempdir");
    let socket_path = dir.path().join("vgpu.sock");

    let mut config = DaemonConfig {
        socket_path: socket_path.to_string_lossy().into_owned(),
        ..DaemonConfig::default()
    };
    configure(&mut config);

    let listener = std::os::unix::net::UnixListener::bind(&socket_path).expect("bind");
    listener.set_nonblocking(true).expect("nonblocking");

    let daemon = VgpuDaemon::with_driver(config, driver);
    let stats = daemon.stats();

    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        runtime.block_on(async move {
            let listener = tokio::net::UnixListener::from_std(listener).expect("listener");
            daemon
                .serve(listener, std::future::pending::<()>())
                .await
                .expect("serve");
        });
    });

    TestDaemon {
        socket_path,
        stats,
        _dir: dir,
    }
}

/// Send one frame and read the full reply.
pub fn round_trip(stream: &mut UnixStream, frame: &[u8]) -> (ReplyHeader, Vec<u8>) {
    stream.write_all(frame).expect("write request");

    let mut header = [0u8; REPLY_HEADER_SIZE];
    stream.read_exact(&mut header).expect("read reply header");
    let header = wire::decode_reply_header(&header).expect("reply header");

    let mut payload = vec![0u8; header.payload_size as usize];
    stream.read_exact(&mut payload).expect("read reply payload");
    (header, payload)
}

/// Assert the daemon closed the connection without sending anything.
pub fn assert_closed_without_reply(stream: &mut UnixStream) {
    let mut buf = [0u8; 1];
    match stream.read(&mut buf) {
        Ok(0) => {}
        Ok(n) => panic!("expected the connection to close, got {} byte(s)", n),
        Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => {}
        Err(e) => panic!("expected the connection to close, got {:?}", e),
    }
}
