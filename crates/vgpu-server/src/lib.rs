pub mod binding;
pub mod dispatch;
pub mod native;
pub mod server;
pub mod session;

pub use binding::{BindingError, NativeBinding};
pub use native::{DriverError, NativeDriver, VulkanDriver};
pub use server::{AcceptBackoff, DaemonError, DaemonStats, VgpuDaemon};
