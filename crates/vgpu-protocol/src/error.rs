/// Status code of a successful reply.
pub const STATUS_OK: i32 = 0;

/// Failures the daemon reports through a negative reply status.
///
/// The guest shim does not distinguish between them; every negative status
/// surfaces as an initialization failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("unsupported command")]
    UnsupportedCommand,

    #[error("native driver call failed")]
    NativeDriver,

    #[error("unknown or stale handle")]
    InvalidHandle,

    #[error("handle table capacity exceeded")]
    CapacityExceeded,

    #[error("unrecognized failure status {0}")]
    Unknown(i32),
}

impl ProtocolError {
    /// The negative status code sent on the wire.
    pub fn status(&self) -> i32 {
        match self {
            ProtocolError::UnsupportedCommand => -1,
            ProtocolError::NativeDriver => -2,
            ProtocolError::InvalidHandle => -3,
            ProtocolError::CapacityExceeded => -4,
            ProtocolError::Unknown(status) => *status,
        }
    }

    /// Interpret a reply status. `Ok(())` for success.
    pub fn from_status(status: i32) -> Result<(), ProtocolError> {
        match status {
            STATUS_OK => Ok(()),
            -1 => Err(ProtocolError::UnsupportedCommand),
            -2 => Err(ProtocolError::NativeDriver),
            -3 => Err(ProtocolError::InvalidHandle),
            -4 => Err(ProtocolError::CapacityExceeded),
            other => Err(ProtocolError::Unknown(other)),
        }
    }
}
