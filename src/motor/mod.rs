// Motor control module for the SO-ARM101 arm
//
// Provides:
// - Feetech STS3215 packet codec
// - Bus error type and shutdown report
// - Byte transport abstraction with a serial port implementation
// - Servo bus controller (connect, read, write, safe shutdown)

mod driver;
pub mod error;
pub mod feetech;
pub mod transport;

pub use driver::ServoBus;
pub use error::{FeetechError, ShutdownReport};
pub use feetech::Positions;
pub use transport::{DuplexStream, SerialStream, SerialTransport, Transport};
