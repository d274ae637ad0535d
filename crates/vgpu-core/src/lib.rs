pub mod config;
pub mod error;
pub mod handle_table;

pub use config::{DaemonConfig, GuestConfig, ReconnectPolicy, VgpuConfig};
pub use error::CoreError;
pub use handle_table::HandleTable;
