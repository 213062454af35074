// Byte transport underneath the servo bus
//
// The driver only needs "write these bytes" and "read up to N bytes, or
// nothing before a deadline". Opening the device and configuring the line
// is the transport's job.

use serialport::{self, ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::{debug, info};

use super::error::Result;

/// An open, exclusively held duplex byte stream
pub trait DuplexStream: Send {
    /// Write the whole buffer
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Read up to `max_len` bytes, waiting at most `timeout`.
    /// An empty buffer means nothing arrived in time.
    fn read(&mut self, max_len: usize, timeout: Duration) -> io::Result<Vec<u8>>;

    fn close(&mut self) -> io::Result<()>;

    /// Whether the read side can still deliver data
    fn is_readable(&self) -> bool {
        true
    }

    /// Drop any bytes already waiting on the read side
    fn discard_input(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Opens duplex streams at a given baud rate
pub trait Transport {
    type Stream: DuplexStream;

    fn open(&mut self, baud_rate: u32) -> Result<Self::Stream>;
}

/// Serial port transport (USB-serial adapter)
pub struct SerialTransport {
    port_name: String,
}

impl SerialTransport {
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
        }
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl Transport for SerialTransport {
    type Stream = SerialStream;

    fn open(&mut self, baud_rate: u32) -> Result<SerialStream> {
        let port = serialport::new(&self.port_name, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open()?;

        info!("Opened {} at {} baud", self.port_name, baud_rate);
        Ok(SerialStream { port: Some(port) })
    }
}

/// Open serial port; `None` once closed
pub struct SerialStream {
    port: Option<Box<dyn SerialPort>>,
}

impl SerialStream {
    fn port(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "serial port closed"))
    }
}

impl DuplexStream for SerialStream {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let port = self.port()?;
        port.write_all(bytes)?;
        port.flush()
    }

    fn read(&mut self, max_len: usize, timeout: Duration) -> io::Result<Vec<u8>> {
        let port = self.port()?;
        port.set_timeout(timeout)?;

        let mut buf = vec![0u8; max_len];
        match port.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn close(&mut self) -> io::Result<()> {
        // Port is released when dropped; flush whatever is still queued
        match self.port.take() {
            Some(mut port) => port.flush(),
            None => Ok(()),
        }
    }

    fn is_readable(&self) -> bool {
        self.port.is_some()
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.port()?.clear(ClearBuffer::Input).map_err(io::Error::from)?;
        debug!("Discarded pending input");
        Ok(())
    }
}
