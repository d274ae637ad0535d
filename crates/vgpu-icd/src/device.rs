//! Vulkan device functions.

use std::os::raw::c_char;

use ash::vk;
use tracing::{debug, warn};

use vgpu_protocol::Handle;

use crate::dispatch::{Dispatchable, DispatchableHandle};
use crate::instance::report_none;
use crate::ipc_client;

/// Guest-side device: just the host handle.
pub struct GuestDevice {
    pub host: Handle,
}

/// The physical device carries no host identity, so the request names the
/// null instance and the daemon falls back to its default instance.
#[no_mangle]
pub unsafe extern "C" fn vkCreateDevice(
    _physical_device: vk::PhysicalDevice,
    _p_create_info: *const vk::DeviceCreateInfo<'_>,
    _p_allocator: *const vk::AllocationCallbacks<'_>,
    p_device: *mut vk::Device,
) -> vk::Result {
    if p_device.is_null() {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    }

    let Some(device) = Dispatchable::new(GuestDevice { host: Handle::NULL }) else {
        return vk::Result::ERROR_OUT_OF_HOST_MEMORY;
    };

    match ipc_client().create_device(Handle::NULL) {
        Ok(host) => {
            unsafe { (*device).object.host = host };
            unsafe { *p_device = vk::Device::from_ptr(device) };
            debug!(%host, "device created");
            vk::Result::SUCCESS
        }
        Err(e) => {
            warn!("vkCreateDevice failed: {}", e);
            unsafe { Dispatchable::destroy(device) };
            vk::Result::ERROR_INITIALIZATION_FAILED
        }
    }
}

/// Frees the guest wrapper only; the host device is never told.
#[no_mangle]
pub unsafe extern "C" fn vkDestroyDevice(
    device: vk::Device,
    _p_allocator: *const vk::AllocationCallbacks<'_>,
) {
    if device == vk::Device::null() {
        return;
    }
    let guest = unsafe { Dispatchable::destroy(device.as_ptr::<GuestDevice>()) };
    debug!(host = %guest.host, "device wrapper freed");
}

#[no_mangle]
pub unsafe extern "C" fn vkEnumerateDeviceExtensionProperties(
    _physical_device: vk::PhysicalDevice,
    _p_layer_name: *const c_char,
    p_property_count: *mut u32,
    _p_properties: *mut vk::ExtensionProperties,
) -> vk::Result {
    unsafe { report_none(p_property_count) }
}
