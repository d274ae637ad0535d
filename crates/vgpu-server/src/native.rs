//! Dynamic loading of the real Vulkan driver.
//!
//! Uses `libloading` to open the Vulkan loader library, resolves
//! `vkGetInstanceProcAddr` once, and reaches every other entry point through
//! it. Only the handful of calls the daemon replays are wrapped.

use std::ffi::CStr;
use std::ptr;

use ash::vk;
use ash::vk::Handle as _;
use libloading::Library;
use tracing::{debug, info, warn};

/// The driver operations the daemon replays. [`VulkanDriver`] is the real
/// implementation; tests plug in a scripted one.
pub trait NativeDriver {
    fn create_instance(&self) -> Result<vk::Instance, DriverError>;

    fn enumerate_physical_devices(
        &self,
        instance: vk::Instance,
    ) -> Result<Vec<vk::PhysicalDevice>, DriverError>;

    /// Create a device with one queue from family 0 at priority 1.0.
    fn create_device(
        &self,
        instance: vk::Instance,
        physical_device: vk::PhysicalDevice,
    ) -> Result<vk::Device, DriverError>;

    fn destroy_device(&self, instance: vk::Instance, device: vk::Device);

    fn destroy_instance(&self, instance: vk::Instance);
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("failed to load {library}: {source}")]
    Load {
        library: String,
        #[source]
        source: libloading::Error,
    },

    #[error("entry point {0} not found")]
    MissingEntryPoint(String),

    #[error("{call} failed: {result:?}")]
    Vulkan {
        call: &'static str,
        result: vk::Result,
    },
}

/// The native Vulkan loader, opened once at daemon startup.
pub struct VulkanDriver {
    get_instance_proc_addr: vk::PFN_vkGetInstanceProcAddr,
    create_instance: vk::PFN_vkCreateInstance,
    // Every resolved function pointer points into this library.
    _library: Library,
}

impl VulkanDriver {
    /// Open `library` and resolve its bootstrap entry points.
    pub fn load(library: &str) -> Result<Self, DriverError> {
        let lib = unsafe { Library::new(library) }.map_err(|source| DriverError::Load {
            library: library.to_string(),
            source,
        })?;

        let get_instance_proc_addr = unsafe {
            lib.get::<vk::PFN_vkGetInstanceProcAddr>(b"vkGetInstanceProcAddr\0")
                .map(|symbol| *symbol)
                .map_err(|_| DriverError::MissingEntryPoint("vkGetInstanceProcAddr".into()))?
        };

        let create_instance: vk::PFN_vkCreateInstance = unsafe {
            resolve(
                get_instance_proc_addr,
                vk::Instance::null(),
                c"vkCreateInstance",
            )?
        };

        info!(library, "native Vulkan driver loaded");

        Ok(Self {
            get_instance_proc_addr,
            create_instance,
            _library: lib,
        })
    }

    fn instance_fn<F>(&self, instance: vk::Instance, name: &'static CStr) -> Result<F, DriverError> {
        unsafe { resolve(self.get_instance_proc_addr, instance, name) }
    }
}

impl NativeDriver for VulkanDriver {
    fn create_instance(&self) -> Result<vk::Instance, DriverError> {
        let app_info = vk::ApplicationInfo::default()
            .application_name(c"virtio-vulkan")
            .application_version(1)
            .engine_name(c"virtio")
            .engine_version(1)
            .api_version(vk::API_VERSION_1_0);
        let create_info = vk::InstanceCreateInfo::default().application_info(&app_info);

        let mut instance = vk::Instance::null();
        unsafe { (self.create_instance)(&create_info, ptr::null(), &mut instance) }
            .result()
            .map_err(|result| DriverError::Vulkan {
                call: "vkCreateInstance",
                result,
            })?;

        debug!(instance = instance.as_raw(), "native instance created");
        Ok(instance)
    }

    fn enumerate_physical_devices(
        &self,
        instance: vk::Instance,
    ) -> Result<Vec<vk::PhysicalDevice>, DriverError> {
        let enumerate: vk::PFN_vkEnumeratePhysicalDevices =
            self.instance_fn(instance, c"vkEnumeratePhysicalDevices")?;
        let err = |result| DriverError::Vulkan {
            call: "vkEnumeratePhysicalDevices",
            result,
        };

        // The count can change between the two calls; retry on INCOMPLETE.
        loop {
            let mut count = 0u32;
            unsafe { enumerate(instance, &mut count, ptr::null_mut()) }
                .result()
                .map_err(err)?;

            let mut devices = vec![vk::PhysicalDevice::null(); count as usize];
            match unsafe { enumerate(instance, &mut count, devices.as_mut_ptr()) } {
                vk::Result::SUCCESS => {
                    devices.truncate(count as usize);
                    return Ok(devices);
                }
                vk::Result::INCOMPLETE => continue,
                result => return Err(err(result)),
            }
        }
    }

    fn create_device(
        &self,
        instance: vk::Instance,
        physical_device: vk::PhysicalDevice,
    ) -> Result<vk::Device, DriverError> {
        let create: vk::PFN_vkCreateDevice = self.instance_fn(instance, c"vkCreateDevice")?;

        let priorities = [1.0f32];
        let queue_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(0)
            .queue_priorities(&priorities)];
        let create_info = vk::DeviceCreateInfo::default().queue_create_infos(&queue_infos);

        let mut device = vk::Device::null();
        unsafe { create(physical_device, &create_info, ptr::null(), &mut device) }
            .result()
            .map_err(|result| DriverError::Vulkan {
                call: "vkCreateDevice",
                result,
            })?;

        debug!(device = device.as_raw(), "native device created");
        Ok(device)
    }

    fn destroy_device(&self, instance: vk::Instance, device: vk::Device) {
        match self.instance_fn::<vk::PFN_vkDestroyDevice>(instance, c"vkDestroyDevice") {
            Ok(destroy) => unsafe { destroy(device, ptr::null()) },
            Err(e) => warn!("cannot destroy device {:#x}: {}", device.as_raw(), e),
        }
    }

    fn destroy_instance(&self, instance: vk::Instance) {
        match self.instance_fn::<vk::PFN_vkDestroyInstance>(instance, c"vkDestroyInstance") {
            Ok(destroy) => unsafe { destroy(instance, ptr::null()) },
            Err(e) => warn!("cannot destroy instance {:#x}: {}", instance.as_raw(), e),
        }
    }
}

/// Resolve `name` through `vkGetInstanceProcAddr` as the function pointer
/// type `F`.
///
/// # Safety
/// `F` must be the `PFN_*` type matching `name`.
unsafe fn resolve<F>(
    get_instance_proc_addr: vk::PFN_vkGetInstanceProcAddr,
    instance: vk::Instance,
    name: &'static CStr,
) -> Result<F, DriverError> {
    let function = unsafe { get_instance_proc_addr(instance, name.as_ptr()) }
        .ok_or_else(|| DriverError::MissingEntryPoint(name.to_string_lossy().into_owned()))?;
    Ok(unsafe { std::mem::transmute_copy::<unsafe extern "system" fn(), F>(&function) })
}
