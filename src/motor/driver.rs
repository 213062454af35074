// Servo bus controller for the SO-ARM101
//
// Owns the open stream and runs one transaction at a time over it.
// Per-motor problems come back as `None` / `false`; only lifecycle
// failures surface as errors.

use std::io;
use std::thread::sleep;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::error::{FeetechError, Result, ShutdownReport};
use super::feetech::{
    POSITION_RESPONSE_LEN, Positions, clamp_position,
    decode_position_response, encode_read_position, encode_write_position,
    encode_write_torque_enable, verify_response,
};
use super::transport::{DuplexStream, Transport};
use crate::config::BusConfig;

/// Controller for a chain of Feetech servos on one half-duplex bus
pub struct ServoBus<T: Transport> {
    transport: T,
    stream: Option<T::Stream>,
    config: BusConfig,
}

impl<T: Transport> ServoBus<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, BusConfig::default())
    }

    pub fn with_config(transport: T, config: BusConfig) -> Self {
        Self {
            transport,
            stream: None,
            config,
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Open the bus at the given baud rate
    pub fn connect(&mut self, baud_rate: u32) -> Result<()> {
        if self.stream.is_some() {
            return Err(FeetechError::AlreadyConnected);
        }

        info!("Connecting to servo bus at {} baud", baud_rate);
        let stream = self.transport.open(baud_rate)?;
        self.stream = Some(stream);
        info!("Serial port connected");
        Ok(())
    }

    /// Disable torque on every motor, then close the bus.
    ///
    /// A failed torque-off write is recorded in the report and the sweep
    /// moves on. The bus ends up disconnected even when closing the stream
    /// fails; that failure is returned as [`FeetechError::Close`].
    /// Calling this while disconnected does nothing.
    pub fn disconnect(&mut self) -> Result<ShutdownReport> {
        let Some(mut stream) = self.stream.take() else {
            debug!("Disconnect requested while not connected");
            return Ok(ShutdownReport::default());
        };

        info!("Disabling torque on motors {:?}", self.config.motor_ids);
        let report = disable_torque_all(
            &mut stream,
            &self.config.motor_ids,
            self.config.torque_off_delay,
        );
        if !report.is_clean() {
            warn!(
                "Torque disable failed on motors {:?}",
                report.failed_ids()
            );
        }

        match stream.close() {
            Ok(()) => {
                info!("Serial port disconnected");
                Ok(report)
            }
            Err(source) => {
                warn!("Failed to close serial port: {}", source);
                Err(FeetechError::Close { source, report })
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| s.is_readable())
    }

    fn stream(&mut self) -> Result<&mut T::Stream> {
        self.stream
            .as_mut()
            .filter(|s| s.is_readable())
            .ok_or(FeetechError::NotConnected)
    }

    /// Read the present position of one motor.
    ///
    /// `Ok(None)` when the motor stays silent past the read timeout, sends a
    /// short or invalid reply, or the transport fails mid-transaction.
    pub fn read_motor_position(&mut self, id: u8) -> Result<Option<u16>> {
        let timeout = self.config.read_timeout;
        let verify = self.config.verify_responses;
        let stream = self.stream()?;

        let response = match read_transaction(stream, id, timeout) {
            Ok(response) => response,
            Err(e) => {
                warn!("Failed to read position from motor {}: {}", id, e);
                return Ok(None);
            }
        };

        if response.is_empty() {
            debug!("Motor {} did not respond within {:?}", id, timeout);
            return Ok(None);
        }

        if verify && response.len() >= POSITION_RESPONSE_LEN {
            if let Err(e) = verify_response(&response, id, 2) {
                warn!("Discarding reply: {}", e);
                return Ok(None);
            }
        }

        let position = decode_position_response(Some(&response));
        match position {
            Some(pos) => debug!("Motor {} position: {}", id, pos),
            None => debug!("Motor {} sent a short reply: {:02X?}", id, response),
        }
        Ok(position)
    }

    /// Read every configured motor in ascending id order, one at a time
    pub fn read_all_positions(&mut self) -> Result<Positions> {
        self.stream()?;

        let ids = self.config.motor_ids.clone();
        let delay = self.config.sweep_delay;
        let mut positions = Positions::new();

        for id in ids {
            let position = self.read_motor_position(id)?;
            positions.insert(id, position);
            // Let the servo finish transmitting before the next request
            sleep(delay);
        }

        Ok(positions)
    }

    /// Send a goal position (clamped to 0-4095). Fire-and-forget: no
    /// acknowledgement is awaited. `Ok(false)` if the write failed.
    pub fn write_motor_position(&mut self, id: u8, position: i32) -> Result<bool> {
        let stream = self.stream()?;
        let packet = encode_write_position(id, position);
        debug!(
            "Write position to motor {}: {}",
            id,
            clamp_position(position)
        );

        match stream.write(&packet) {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!("Failed to write position to motor {}: {}", id, e);
                Ok(false)
            }
        }
    }
}

impl<T: Transport> Drop for ServoBus<T> {
    fn drop(&mut self) {
        // Never leave motors holding torque on an abandoned bus
        if self.stream.is_some() {
            if let Err(e) = self.disconnect() {
                warn!("Failed to disconnect on drop: {}", e);
            }
        }
    }
}

/// Send a read request and collect the reply until it is complete or the
/// deadline passes. Returns whatever arrived (possibly nothing).
fn read_transaction<S: DuplexStream>(
    stream: &mut S,
    id: u8,
    timeout: Duration,
) -> io::Result<Vec<u8>> {
    // A late reply from a previous transaction must not be taken for this one
    if let Err(e) = stream.discard_input() {
        debug!("Could not discard pending input: {}", e);
    }

    stream.write(&encode_read_position(id))?;

    let deadline = Instant::now() + timeout;
    let mut response = Vec::with_capacity(POSITION_RESPONSE_LEN);
    while response.len() < POSITION_RESPONSE_LEN {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        let chunk = stream.read(POSITION_RESPONSE_LEN - response.len(), remaining)?;
        if chunk.is_empty() {
            break;
        }
        response.extend_from_slice(&chunk);
    }

    Ok(response)
}

/// Best-effort torque off: every motor is attempted, failures are collected
fn disable_torque_all<S: DuplexStream>(
    stream: &mut S,
    ids: &[u8],
    delay: Duration,
) -> ShutdownReport {
    let mut report = ShutdownReport::default();

    for &id in ids {
        match stream.write(&encode_write_torque_enable(id, false)) {
            Ok(()) => {
                debug!("Torque disabled on motor {}", id);
                report.disabled.push(id);
            }
            Err(e) => {
                warn!("Failed to disable torque on motor {}: {}", id, e);
                report.failed.insert(id, e);
            }
        }
        sleep(delay);
    }

    report
}
