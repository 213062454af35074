// Command line surface for the arm

use clap::{Parser, Subcommand};
use std::time::Duration;

use crate::config::{BAUD_RATE, BusConfig, MONITOR_HZ, MOTOR_PORT, READ_TIMEOUT};

#[derive(Debug, Parser)]
#[command(name = "so-arm", version, about = "Read and drive the SO-ARM101 servo bus")]
pub struct Cli {
    /// Serial port of the servo adapter
    #[arg(long, default_value = MOTOR_PORT)]
    pub port: String,

    #[arg(long, default_value_t = BAUD_RATE)]
    pub baud: u32,

    /// How long to wait for each motor's reply
    #[arg(long, default_value_t = READ_TIMEOUT.as_millis() as u64)]
    pub timeout_ms: u64,

    /// Trust replies without checking id and checksum
    #[arg(long)]
    pub no_verify: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Read every motor once
    Positions {
        #[arg(long)]
        json: bool,
    },
    /// Read one motor
    Read {
        #[arg(value_parser = clap::value_parser!(u8).range(1..=252))]
        id: u8,
    },
    /// Move one motor and hold it until Ctrl+C
    Write {
        #[arg(value_parser = clap::value_parser!(u8).range(1..=252))]
        id: u8,
        /// Raw goal position, clamped to 0-4095
        #[arg(allow_negative_numbers = true)]
        position: i32,
    },
    /// Poll all motors until Ctrl+C
    Monitor {
        #[arg(long, default_value_t = MONITOR_HZ, value_parser = clap::value_parser!(u64).range(1..=20))]
        hz: u64,
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    pub fn bus_config(&self) -> BusConfig {
        BusConfig {
            read_timeout: Duration::from_millis(self.timeout_ms),
            verify_responses: !self.no_verify,
            ..BusConfig::default()
        }
    }
}
