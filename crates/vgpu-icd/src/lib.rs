//! vgpu Vulkan ICD (Installable Client Driver)
//!
//! This cdylib presents the host's Vulkan driver to a guest process. Each
//! forwarding entry point becomes exactly one round trip to the vgpu daemon;
//! destroy functions free guest memory only.

use std::ffi::{c_char, CStr};
use std::sync::OnceLock;

use ash::vk;
use tracing::{info, warn};

use vgpu_core::config::{default_config_path, VgpuConfig};
use vgpu_ipc_client::IpcClient;

pub mod device;
pub mod dispatch;
pub mod instance;

/// Highest loader interface version this ICD implements.
pub const MAX_LOADER_INTERFACE_VERSION: u32 = 5;

/// `PFN_vkVoidFunction`.
pub type VoidFunction = Option<unsafe extern "C" fn()>;

// ── IPC Client singleton ────────────────────────────────────

static IPC_CLIENT: OnceLock<IpcClient> = OnceLock::new();

/// The process-wide client, created on first use. The socket itself is only
/// opened by the first request.
pub fn ipc_client() -> &'static IpcClient {
    IPC_CLIENT.get_or_init(|| {
        vgpu_common::try_init_logging();
        let config = match VgpuConfig::load_or_default(default_config_path()) {
            Ok(config) => config,
            Err(e) => {
                warn!("ignoring unreadable vgpu config: {}", e);
                VgpuConfig::default()
            }
        };
        let client = IpcClient::from_config(&config.guest);
        info!(path = client.path(), policy = ?client.policy(), "vgpu ICD initialized");
        client
    })
}

// ── Name resolution ─────────────────────────────────────────

macro_rules! proc_addr {
    ($f:path) => {
        Some(unsafe { std::mem::transmute::<*const (), unsafe extern "C" fn()>($f as *const ()) })
    };
}

/// Instance-level entry points, by exact name.
pub fn instance_proc_addr(name: &CStr) -> VoidFunction {
    match name.to_str().ok()? {
        // ── ICD entry points ────────────────────────────────
        "vk_icdNegotiateLoaderICDInterfaceVersion" => {
            proc_addr!(vk_icdNegotiateLoaderICDInterfaceVersion)
        }
        "vk_icdGetInstanceProcAddr" => proc_addr!(vk_icdGetInstanceProcAddr),
        "vk_icdGetPhysicalDeviceProcAddr" => proc_addr!(vk_icdGetPhysicalDeviceProcAddr),
        "vkGetInstanceProcAddr" => proc_addr!(vkGetInstanceProcAddr),

        // ── Instance ────────────────────────────────────────
        "vkCreateInstance" => proc_addr!(instance::vkCreateInstance),
        "vkDestroyInstance" => proc_addr!(instance::vkDestroyInstance),
        "vkEnumerateInstanceExtensionProperties" => {
            proc_addr!(instance::vkEnumerateInstanceExtensionProperties)
        }
        "vkEnumerateInstanceLayerProperties" => {
            proc_addr!(instance::vkEnumerateInstanceLayerProperties)
        }
        "vkEnumeratePhysicalDevices" => proc_addr!(instance::vkEnumeratePhysicalDevices),

        // ── Device ──────────────────────────────────────────
        "vkCreateDevice" => proc_addr!(device::vkCreateDevice),
        "vkDestroyDevice" => proc_addr!(device::vkDestroyDevice),
        "vkEnumerateDeviceExtensionProperties" => {
            proc_addr!(device::vkEnumerateDeviceExtensionProperties)
        }
        "vkGetDeviceProcAddr" => proc_addr!(vkGetDeviceProcAddr),

        _ => None,
    }
}

/// Device-level entry points, by exact name.
pub fn device_proc_addr(name: &CStr) -> VoidFunction {
    match name.to_str().ok()? {
        "vkGetDeviceProcAddr" => proc_addr!(vkGetDeviceProcAddr),
        "vkDestroyDevice" => proc_addr!(device::vkDestroyDevice),
        _ => None,
    }
}

/// # Safety
/// `p_name` must be null or a valid NUL-terminated string.
unsafe fn name_arg<'a>(p_name: *const c_char) -> Option<&'a CStr> {
    if p_name.is_null() {
        None
    } else {
        Some(unsafe { CStr::from_ptr(p_name) })
    }
}

// ── ICD Negotiation ─────────────────────────────────────────

/// Negotiate the ICD interface version with the Vulkan loader.
#[no_mangle]
pub unsafe extern "C" fn vk_icdNegotiateLoaderICDInterfaceVersion(
    p_supported_version: *mut u32,
) -> vk::Result {
    if p_supported_version.is_null() {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    }
    unsafe {
        *p_supported_version = (*p_supported_version).min(MAX_LOADER_INTERFACE_VERSION);
    }
    vk::Result::SUCCESS
}

/// Returns function pointers for Vulkan functions.
/// The Vulkan loader calls this to resolve all Vulkan entry points.
#[no_mangle]
pub unsafe extern "C" fn vk_icdGetInstanceProcAddr(
    _instance: vk::Instance,
    p_name: *const c_char,
) -> VoidFunction {
    instance_proc_addr(unsafe { name_arg(p_name) }?)
}

#[no_mangle]
pub unsafe extern "C" fn vkGetInstanceProcAddr(
    instance: vk::Instance,
    p_name: *const c_char,
) -> VoidFunction {
    unsafe { vk_icdGetInstanceProcAddr(instance, p_name) }
}

/// No physical-device-level extension functions are implemented.
#[no_mangle]
pub unsafe extern "C" fn vk_icdGetPhysicalDeviceProcAddr(
    _instance: vk::Instance,
    _p_name: *const c_char,
) -> VoidFunction {
    None
}

#[no_mangle]
pub unsafe extern "C" fn vkGetDeviceProcAddr(
    _device: vk::Device,
    p_name: *const c_char,
) -> VoidFunction {
    device_proc_addr(unsafe { name_arg(p_name) }?)
}
