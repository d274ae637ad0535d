pub mod command;
pub mod error;
pub mod handle;
pub mod wire;

pub use command::Command;
pub use error::ProtocolError;
pub use handle::Handle;
pub use wire::{MessageHeader, ReplyHeader, WireError};
