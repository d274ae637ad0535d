/// Well-known path of the daemon's listening socket.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/vgpu.sock";

/// Environment override for the guest-side socket path.
pub const SOCKET_ENV: &str = "VGPU_SOCKET";

/// Returns the default daemon socket path.
pub fn default_socket_path() -> String {
    DEFAULT_SOCKET_PATH.to_string()
}

/// Socket path the guest should connect to: `VGPU_SOCKET` if set, otherwise
/// the configured path.
pub fn guest_socket_path(configured: &str) -> String {
    match std::env::var(SOCKET_ENV) {
        Ok(path) if !path.is_empty() => path,
        _ => configured.to_string(),
    }
}

/// Returns the platform's Vulkan loader library name.
pub fn default_driver_library() -> String {
    #[cfg(target_os = "linux")]
    {
        "libvulkan.so.1".to_string()
    }
    #[cfg(target_os = "macos")]
    {
        "libvulkan.1.dylib".to_string()
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        "libvulkan.so".to_string()
    }
}
