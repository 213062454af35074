// Message types printed by the runtime

use serde::{Deserialize, Serialize};

use crate::motor::feetech::{Positions, position_to_degrees};

/// One motor's position as shown to the operator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionReport {
    pub motor_id: u8,
    pub raw: Option<u16>,
    pub degrees: Option<f32>,
}

impl PositionReport {
    pub fn new(motor_id: u8, raw: Option<u16>) -> Self {
        Self {
            motor_id,
            raw,
            degrees: raw.map(position_to_degrees),
        }
    }
}

impl std::fmt::Display for PositionReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.raw, self.degrees) {
            (Some(raw), Some(deg)) => write!(f, "Motor {}: {} ({:.2}°)", self.motor_id, raw, deg),
            _ => write!(f, "Motor {}: No response", self.motor_id),
        }
    }
}

/// Result of one sweep over the arm
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PositionSnapshot {
    pub motors: Vec<PositionReport>,
}

// Sweep results come back keyed by id; keep that order
impl From<&Positions> for PositionSnapshot {
    fn from(positions: &Positions) -> Self {
        Self {
            motors: positions
                .iter()
                .map(|(&id, &raw)| PositionReport::new(id, raw))
                .collect(),
        }
    }
}

impl PositionSnapshot {
    pub fn responding(&self) -> usize {
        self.motors.iter().filter(|m| m.raw.is_some()).count()
    }
}
