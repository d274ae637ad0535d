//! Vulkan instance and enumeration functions.

use std::os::raw::c_char;

use ash::vk;
use tracing::{debug, warn};

use vgpu_protocol::Handle;

use crate::dispatch::{Dispatchable, DispatchableHandle};
use crate::ipc_client;

/// Guest-side instance: the host handle plus the single synthetic physical
/// device every enumeration returns.
pub struct GuestInstance {
    pub host: Handle,
    pub physical_device: *mut Dispatchable<GuestPhysicalDevice>,
}

/// Placeholder for a host physical device. The wire protocol reports only a
/// count, never an identity, so all host devices share this one.
pub struct GuestPhysicalDevice {
    pub id: u32,
}

const SYNTHETIC_PHYSICAL_DEVICE_ID: u32 = 0;

#[no_mangle]
pub unsafe extern "C" fn vkCreateInstance(
    _p_create_info: *const vk::InstanceCreateInfo<'_>,
    _p_allocator: *const vk::AllocationCallbacks<'_>,
    p_instance: *mut vk::Instance,
) -> vk::Result {
    if p_instance.is_null() {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    }

    // Allocate locally first so a failed allocation never strands a host
    // instance.
    let Some(physical_device) = Dispatchable::new(GuestPhysicalDevice {
        id: SYNTHETIC_PHYSICAL_DEVICE_ID,
    }) else {
        return vk::Result::ERROR_OUT_OF_HOST_MEMORY;
    };
    let Some(instance) = Dispatchable::new(GuestInstance {
        host: Handle::NULL,
        physical_device,
    }) else {
        unsafe { Dispatchable::destroy(physical_device) };
        return vk::Result::ERROR_OUT_OF_HOST_MEMORY;
    };

    match ipc_client().create_instance() {
        Ok(host) => {
            unsafe { (*instance).object.host = host };
            unsafe { *p_instance = vk::Instance::from_ptr(instance) };
            debug!(%host, "instance created");
            vk::Result::SUCCESS
        }
        Err(e) => {
            warn!("vkCreateInstance failed: {}", e);
            let guest = unsafe { Dispatchable::destroy(instance) };
            unsafe { Dispatchable::destroy(guest.physical_device) };
            vk::Result::ERROR_INITIALIZATION_FAILED
        }
    }
}

/// Frees the guest wrapper only; the host instance is never told.
#[no_mangle]
pub unsafe extern "C" fn vkDestroyInstance(
    instance: vk::Instance,
    _p_allocator: *const vk::AllocationCallbacks<'_>,
) {
    if instance == vk::Instance::null() {
        return;
    }
    let guest = unsafe { Dispatchable::destroy(instance.as_ptr::<GuestInstance>()) };
    unsafe { Dispatchable::destroy(guest.physical_device) };
    debug!(host = %guest.host, "instance wrapper freed");
}

#[no_mangle]
pub unsafe extern "C" fn vkEnumeratePhysicalDevices(
    instance: vk::Instance,
    p_physical_device_count: *mut u32,
    p_physical_devices: *mut vk::PhysicalDevice,
) -> vk::Result {
    if p_physical_device_count.is_null() {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    }
    let Some(guest) = (unsafe { Dispatchable::get(instance.as_ptr::<GuestInstance>()) }) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };

    let count = match ipc_client().enumerate_physical_devices(guest.host) {
        Ok(count) => count,
        Err(e) => {
            warn!("vkEnumeratePhysicalDevices failed: {}", e);
            return vk::Result::ERROR_INITIALIZATION_FAILED;
        }
    };

    if p_physical_devices.is_null() {
        unsafe { *p_physical_device_count = count };
        return vk::Result::SUCCESS;
    }

    let capacity = unsafe { *p_physical_device_count };
    let written = capacity.min(count);
    let physical_device = vk::PhysicalDevice::from_ptr(guest.physical_device);
    for i in 0..written as usize {
        unsafe { *p_physical_devices.add(i) = physical_device };
    }
    unsafe { *p_physical_device_count = written };

    if written < count {
        vk::Result::INCOMPLETE
    } else {
        vk::Result::SUCCESS
    }
}

#[no_mangle]
pub unsafe extern "C" fn vkEnumerateInstanceExtensionProperties(
    _p_layer_name: *const c_char,
    p_property_count: *mut u32,
    _p_properties: *mut vk::ExtensionProperties,
) -> vk::Result {
    unsafe { report_none(p_property_count) }
}

#[no_mangle]
pub unsafe extern "C" fn vkEnumerateInstanceLayerProperties(
    p_property_count: *mut u32,
    _p_properties: *mut vk::LayerProperties,
) -> vk::Result {
    unsafe { report_none(p_property_count) }
}

/// Answer an enumeration with zero entries.
///
/// # Safety
/// `p_count` must be null or valid for writes.
pub(crate) unsafe fn report_none(p_count: *mut u32) -> vk::Result {
    if p_count.is_null() {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    }
    unsafe { *p_count = 0 };
    vk::Result::SUCCESS
}
