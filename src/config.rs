// Serial settings, bus timing, motor configuration
use std::time::Duration;

// Serial port for the SO-ARM101 servo adapter (CH340 / CP210x / FTDI)
pub const MOTOR_PORT: &str = "/dev/ttyACM0";

// STS3215 bus speed (8N1)
pub const BAUD_RATE: u32 = 1_000_000;

// SO-ARM101 has 6 motors with IDs 1-6
pub const ARM_MOTOR_IDS: [u8; 6] = [1, 2, 3, 4, 5, 6];

// How long a read transaction waits for a reply before giving up
pub const READ_TIMEOUT: Duration = Duration::from_millis(2000);

// Settle time after each read in a sweep (servo finishes transmitting)
pub const SWEEP_DELAY: Duration = Duration::from_millis(50);

// Bus turnaround after each torque-off write during shutdown
pub const TORQUE_OFF_DELAY: Duration = Duration::from_millis(20);

// Monitor loop frequency
pub const MONITOR_HZ: u64 = 2;

/// Runtime bus settings, defaults taken from the constants above
#[derive(Debug, Clone)]
pub struct BusConfig {
    pub motor_ids: Vec<u8>,
    pub read_timeout: Duration,
    pub sweep_delay: Duration,
    pub torque_off_delay: Duration,
    /// Check header, id and checksum of replies before trusting them
    pub verify_responses: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            motor_ids: ARM_MOTOR_IDS.to_vec(),
            read_timeout: READ_TIMEOUT,
            sweep_delay: SWEEP_DELAY,
            torque_off_delay: TORQUE_OFF_DELAY,
            verify_responses: true,
        }
    }
}
