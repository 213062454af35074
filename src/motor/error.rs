// Errors and shutdown outcome shared by the codec and the driver

use std::collections::BTreeMap;
use std::io;

/// Error types for the servo bus
#[derive(Debug, thiserror::Error)]
pub enum FeetechError {
    #[error("Not connected to a serial port")]
    NotConnected,

    #[error("Already connected to a serial port")]
    AlreadyConnected,

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid response from motor {id}: {reason}")]
    InvalidResponse { id: u8, reason: String },

    #[error("Checksum mismatch for motor {id}")]
    ChecksumMismatch { id: u8 },

    #[error("Bus owner task stopped")]
    OwnerStopped,

    #[error("Failed to close serial port: {source}")]
    Close {
        source: io::Error,
        report: ShutdownReport,
    },
}

pub type Result<T> = std::result::Result<T, FeetechError>;

/// Outcome of the torque-off sweep run on disconnect
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// Motors that were sent a torque-disable packet
    pub disabled: Vec<u8>,
    /// Motors whose torque-disable write failed
    pub failed: BTreeMap<u8, io::Error>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_ids(&self) -> Vec<u8> {
        self.failed.keys().copied().collect()
    }
}
