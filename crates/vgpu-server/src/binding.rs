//! Host handle tables over the native driver.
//!
//! The binding owns every native object the daemon creates and hands out
//! [`Handle`]s in their place. Instance handle 0 names the default instance:
//! the most recently created one that is still alive.

use ash::vk;
use ash::vk::Handle as _;
use tracing::{debug, info, warn};

use vgpu_core::{CoreError, DaemonConfig, HandleTable};
use vgpu_protocol::{Handle, ProtocolError};

use crate::native::{DriverError, NativeDriver};
use crate::session::Session;

#[derive(Debug, thiserror::Error)]
pub enum BindingError {
    #[error("unknown or stale {kind} handle {handle}")]
    InvalidHandle { kind: &'static str, handle: Handle },

    #[error("no live instance to use as the default")]
    NoDefaultInstance,

    #[error("instance {0} still has live devices")]
    InstanceInUse(Handle),

    #[error("host reports no physical devices")]
    NoPhysicalDevice,

    #[error(transparent)]
    Table(#[from] CoreError),

    #[error(transparent)]
    Driver(#[from] DriverError),
}

impl BindingError {
    /// The failure reported to the guest.
    pub fn protocol_error(&self) -> ProtocolError {
        match self {
            BindingError::InvalidHandle { .. }
            | BindingError::NoDefaultInstance
            | BindingError::InstanceInUse(_) => ProtocolError::InvalidHandle,
            BindingError::Table(CoreError::CapacityExceeded { .. }) => {
                ProtocolError::CapacityExceeded
            }
            BindingError::Table(_)
            | BindingError::NoPhysicalDevice
            | BindingError::Driver(_) => ProtocolError::NativeDriver,
        }
    }
}

struct DeviceEntry {
    device: vk::Device,
    instance: Handle,
}

/// What a session release destroyed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseSummary {
    pub devices: usize,
    pub instances: usize,
}

pub struct NativeBinding<D> {
    driver: D,
    instances: HandleTable<vk::Instance>,
    devices: HandleTable<DeviceEntry>,
}

impl<D: NativeDriver> NativeBinding<D> {
    pub fn new(driver: D, max_instances: usize, max_devices: usize) -> Self {
        Self {
            driver,
            instances: HandleTable::new("instance", max_instances),
            devices: HandleTable::new("device", max_devices),
        }
    }

    pub fn from_config(driver: D, config: &DaemonConfig) -> Self {
        Self::new(driver, config.max_instances, config.max_devices)
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Create a native instance and issue its handle.
    pub fn create_instance(&mut self) -> Result<Handle, BindingError> {
        // Refuse before touching the driver so a full table leaks nothing.
        if self.instances.is_full() {
            return Err(capacity_exceeded(&self.instances));
        }

        let instance = self.driver.create_instance()?;
        match self.instances.insert(instance) {
            Ok(handle) => {
                info!(%handle, native = instance.as_raw(), "instance created");
                Ok(handle)
            }
            Err(e) => {
                self.driver.destroy_instance(instance);
                Err(e.into())
            }
        }
    }

    /// Resolve an instance handle, mapping the null handle to the default
    /// instance.
    pub fn resolve_instance(&self, handle: Handle) -> Result<(Handle, vk::Instance), BindingError> {
        let handle = if handle.is_null() {
            self.instances
                .newest()
                .ok_or(BindingError::NoDefaultInstance)?
        } else {
            handle
        };

        self.instances
            .get(handle)
            .map(|instance| (handle, *instance))
            .ok_or(BindingError::InvalidHandle {
                kind: "instance",
                handle,
            })
    }

    /// Number of physical devices the driver reports for an instance.
    pub fn physical_device_count(&self, instance: Handle) -> Result<u32, BindingError> {
        let (handle, native) = self.resolve_instance(instance)?;
        let devices = self.driver.enumerate_physical_devices(native)?;
        debug!(instance = %handle, count = devices.len(), "physical devices enumerated");
        Ok(devices.len() as u32)
    }

    /// Create a device on the first physical device of an instance.
    pub fn create_device(&mut self, instance: Handle) -> Result<Handle, BindingError> {
        let (instance, native) = self.resolve_instance(instance)?;
        if self.devices.is_full() {
            return Err(capacity_exceeded(&self.devices));
        }

        let physical_device = self
            .driver
            .enumerate_physical_devices(native)?
            .first()
            .copied()
            .ok_or(BindingError::NoPhysicalDevice)?;

        let device = self.driver.create_device(native, physical_device)?;
        match self.devices.insert(DeviceEntry { device, instance }) {
            Ok(handle) => {
                info!(%handle, %instance, native = device.as_raw(), "device created");
                Ok(handle)
            }
            Err(e) => {
                self.driver.destroy_device(native, device);
                Err(e.into())
            }
        }
    }

    /// The instance a device was created against.
    pub fn device_instance(&self, device: Handle) -> Option<Handle> {
        self.devices.get(device).map(|entry| entry.instance)
    }

    pub fn destroy_device(&mut self, handle: Handle) -> Result<(), BindingError> {
        let entry = self.devices.remove(handle).ok_or(BindingError::InvalidHandle {
            kind: "device",
            handle,
        })?;

        match self.instances.get(entry.instance) {
            Some(instance) => self.driver.destroy_device(*instance, entry.device),
            None => warn!(device = %handle, instance = %entry.instance, "device outlived its instance"),
        }
        debug!(device = %handle, "device destroyed");
        Ok(())
    }

    /// Destroy an instance. Refused while any device created against it is
    /// still alive.
    pub fn destroy_instance(&mut self, handle: Handle) -> Result<(), BindingError> {
        if !self.instances.contains(handle) {
            return Err(BindingError::InvalidHandle {
                kind: "instance",
                handle,
            });
        }
        if self.devices.iter().any(|(_, entry)| entry.instance == handle) {
            return Err(BindingError::InstanceInUse(handle));
        }

        if let Some(instance) = self.instances.remove(handle) {
            self.driver.destroy_instance(instance);
        }
        debug!(instance = %handle, "instance destroyed");
        Ok(())
    }

    /// Destroy everything a session created: devices first, then instances.
    /// Instances another session still has devices on are left alive.
    pub fn release_session(&mut self, session: &Session) -> ReleaseSummary {
        let mut summary = ReleaseSummary::default();

        for &device in session.devices().iter().rev() {
            if self.destroy_device(device).is_ok() {
                summary.devices += 1;
            }
        }

        for &instance in session.instances().iter().rev() {
            match self.destroy_instance(instance) {
                Ok(()) => summary.instances += 1,
                Err(BindingError::InstanceInUse(handle)) => {
                    warn!(instance = %handle, "instance still in use by another connection, keeping it");
                }
                Err(_) => {}
            }
        }

        summary
    }
}

fn capacity_exceeded<T>(table: &HandleTable<T>) -> BindingError {
    BindingError::Table(CoreError::CapacityExceeded {
        kind: table.kind(),
        capacity: table.capacity(),
    })
}
