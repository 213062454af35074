// Feetech STS3215 serial protocol implementation
//
// Protocol is similar to Dynamixel Protocol 1.0:
// Packet format: [0xFF, 0xFF, ID, Length, Instruction, Params..., Checksum]
//
// Everything in this module is pure: packets are built and parsed here,
// the bytes are moved by the driver.

use std::collections::BTreeMap;

use super::error::{FeetechError, Result};

/// Packet header bytes
const HEADER: [u8; 2] = [0xFF, 0xFF];

/// Highest raw position (12-bit encoder)
pub const MAX_POSITION: u16 = 4095;

/// Reply to a 2-byte read: header(2) + id + length + error + 2 params + checksum
pub const POSITION_RESPONSE_LEN: usize = 8;

/// Instruction set used by this runtime
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Instruction {
    Read = 0x02,
    Write = 0x03,
}

/// Register addresses for STS3215 (RAM area)
#[repr(u8)]
#[derive(Debug, Clone, Copy)]
pub enum Register {
    TorqueEnable = 0x28,    // 1 byte: 0=off, 1=on
    GoalPosition = 0x2A,    // 2 bytes
    PresentPosition = 0x38, // 2 bytes, read-only
}

/// Raw positions keyed by motor id, `None` where the motor did not answer
pub type Positions = BTreeMap<u8, Option<u16>>;

/// Calculate checksum for a packet (excluding header)
pub fn checksum(data: &[u8]) -> u8 {
    let sum: u32 = data.iter().map(|&b| b as u32).sum();
    (!sum & 0xFF) as u8
}

/// Build a packet with header and checksum
fn build_packet(id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
    let length = (params.len() + 2) as u8; // params + instruction + checksum
    let mut packet = Vec::with_capacity(6 + params.len());

    packet.extend_from_slice(&HEADER);
    packet.push(id);
    packet.push(length);
    packet.push(instruction as u8);
    packet.extend_from_slice(params);

    // Checksum over id, length, instruction, params
    let checksum_data = &packet[2..]; // skip header
    packet.push(checksum(checksum_data));

    packet
}

/// Request the 2-byte present position register
pub fn encode_read_position(id: u8) -> Vec<u8> {
    build_packet(
        id,
        Instruction::Read,
        &[Register::PresentPosition as u8, 2], // address, length
    )
}

/// Set the goal position; out-of-range values are clamped to [0, 4095]
pub fn encode_write_position(id: u8, position: i32) -> Vec<u8> {
    let [low, high] = clamp_position(position).to_le_bytes();
    build_packet(
        id,
        Instruction::Write,
        &[Register::GoalPosition as u8, low, high],
    )
}

pub fn encode_write_torque_enable(id: u8, enabled: bool) -> Vec<u8> {
    build_packet(
        id,
        Instruction::Write,
        &[Register::TorqueEnable as u8, enabled as u8],
    )
}

/// Extract the position from a read reply.
///
/// Only the two parameter bytes are looked at; anything shorter than a full
/// reply (or no reply at all) is `None`. Use [`verify_response`] first if the
/// frame should be trusted.
pub fn decode_position_response(bytes: Option<&[u8]>) -> Option<u16> {
    match bytes {
        Some(b) if b.len() >= POSITION_RESPONSE_LEN => Some(u16::from_le_bytes([b[5], b[6]])),
        _ => None,
    }
}

/// Check header, responding id, length field and checksum of a reply
/// carrying `param_len` parameter bytes.
pub fn verify_response(bytes: &[u8], expected_id: u8, param_len: usize) -> Result<()> {
    let frame_len = param_len + 6;
    if bytes.len() < frame_len {
        return Err(FeetechError::InvalidResponse {
            id: expected_id,
            reason: format!("Expected {} bytes, got {}", frame_len, bytes.len()),
        });
    }

    if bytes[..2] != HEADER {
        return Err(FeetechError::InvalidResponse {
            id: expected_id,
            reason: format!("Invalid header: {:02X?}", &bytes[..2]),
        });
    }

    let id = bytes[2];
    if id != expected_id {
        return Err(FeetechError::InvalidResponse {
            id: expected_id,
            reason: format!("ID mismatch: expected {}, got {}", expected_id, id),
        });
    }

    // error + params + checksum
    let length = bytes[3] as usize;
    if length != param_len + 2 {
        return Err(FeetechError::InvalidResponse {
            id,
            reason: format!("Unexpected length field {}", length),
        });
    }

    if checksum(&bytes[2..frame_len - 1]) != bytes[frame_len - 1] {
        return Err(FeetechError::ChecksumMismatch { id });
    }

    Ok(())
}

pub fn clamp_position(position: i32) -> u16 {
    position.clamp(0, MAX_POSITION as i32) as u16
}

/// Convert a raw position (0-4095) to degrees (0-360)
pub fn position_to_degrees(position: u16) -> f32 {
    position as f32 / MAX_POSITION as f32 * 360.0
}

/// Build the reply a servo sends for a present-position read
#[cfg(test)]
pub(crate) fn position_reply(id: u8, position: u16) -> Vec<u8> {
    let [low, high] = position.to_le_bytes();
    let mut reply = vec![0xFF, 0xFF, id, 4, 0, low, high];
    reply.push(checksum(&reply[2..]));
    reply
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_checksum_consistent(packet: &[u8]) {
        let last = packet.len() - 1;
        assert_eq!(packet[last], checksum(&packet[2..last]), "{:02X?}", packet);
    }

    #[test]
    fn test_checksum() {
        // Example: ID=1, Length=4, Instruction=WRITE, Addr=30, Data=0, 2
        let data = [1u8, 4, 0x03, 30, 0, 2];
        // ~(1+4+3+30+0+2) = ~40 = 215
        assert_eq!(checksum(&data), 215);
    }

    #[test]
    fn test_checksum_wraps_past_one_byte() {
        // 0xFE + 0xFE + 0x05 = 0x201 -> low byte 0x01 -> ~0x01 = 0xFE
        assert_eq!(checksum(&[0xFE, 0xFE, 0x05]), 0xFE);
    }

    #[test]
    fn test_read_position_packet() {
        // sum = 1 + 4 + 2 + 0x38 + 2 = 0x41, ~0x41 = 0xBE
        assert_eq!(
            encode_read_position(1),
            vec![0xFF, 0xFF, 0x01, 0x04, 0x02, 0x38, 0x02, 0xBE]
        );
    }

    #[test]
    fn test_write_position_packet() {
        // 2048 = 0x0800, sum = 1 + 5 + 3 + 0x2A + 0x00 + 0x08 = 0x3B, ~0x3B = 0xC4
        assert_eq!(
            encode_write_position(1, 2048),
            vec![0xFF, 0xFF, 0x01, 0x05, 0x03, 0x2A, 0x00, 0x08, 0xC4]
        );
    }

    #[test]
    fn test_torque_packets() {
        // sum = 1 + 4 + 3 + 0x28 + 0 = 0x30, ~0x30 = 0xCF
        assert_eq!(
            encode_write_torque_enable(1, false),
            vec![0xFF, 0xFF, 0x01, 0x04, 0x03, 0x28, 0x00, 0xCF]
        );
        assert_eq!(
            encode_write_torque_enable(1, true),
            vec![0xFF, 0xFF, 0x01, 0x04, 0x03, 0x28, 0x01, 0xCE]
        );
    }

    #[test]
    fn test_write_position_clamps() {
        assert_eq!(encode_write_position(3, -10), encode_write_position(3, 0));
        assert_eq!(encode_write_position(3, 9000), encode_write_position(3, 4095));
        assert_eq!(clamp_position(i32::MIN), 0);
        assert_eq!(clamp_position(i32::MAX), MAX_POSITION);
    }

    #[test]
    fn test_every_packet_has_valid_checksum() {
        for id in 1..=252u8 {
            assert_checksum_consistent(&encode_read_position(id));
            assert_checksum_consistent(&encode_write_torque_enable(id, true));
            assert_checksum_consistent(&encode_write_torque_enable(id, false));
            for position in (0..=4095).step_by(97).chain([4095]) {
                assert_checksum_consistent(&encode_write_position(id, position));
            }
        }
    }

    #[test]
    fn test_position_split_survives_echo() {
        // Write packet param bytes moved into a read reply decode to the same value
        for id in 1..=252u8 {
            for position in (0..=MAX_POSITION).step_by(13).chain([MAX_POSITION]) {
                let packet = encode_write_position(id, position as i32);
                let (low, high) = (packet[6], packet[7]);
                let mut reply = vec![0xFF, 0xFF, id, 4, 0, low, high];
                reply.push(checksum(&reply[2..]));
                assert_eq!(decode_position_response(Some(&reply)), Some(position));
            }
        }
    }

    #[test]
    fn test_decode_without_data() {
        assert_eq!(decode_position_response(None), None);
        let reply = position_reply(2, 1234);
        for len in 0..POSITION_RESPONSE_LEN {
            assert_eq!(decode_position_response(Some(&reply[..len])), None);
        }
        assert_eq!(decode_position_response(Some(&reply)), Some(1234));
    }

    #[test]
    fn test_decode_ignores_other_fields() {
        // Error byte and checksum are not inspected
        let reply = [0x00, 0x00, 9, 9, 0x20, 0x34, 0x12, 0x00];
        assert_eq!(decode_position_response(Some(&reply)), Some(0x1234));
    }

    #[test]
    fn test_verify_response() {
        let reply = position_reply(4, 3000);
        assert!(verify_response(&reply, 4, 2).is_ok());

        assert!(matches!(
            verify_response(&reply, 5, 2),
            Err(FeetechError::InvalidResponse { id: 5, .. })
        ));

        let mut corrupted = reply.clone();
        corrupted[5] ^= 0x01;
        assert!(matches!(
            verify_response(&corrupted, 4, 2),
            Err(FeetechError::ChecksumMismatch { id: 4 })
        ));

        let mut bad_header = reply.clone();
        bad_header[0] = 0x00;
        assert!(verify_response(&bad_header, 4, 2).is_err());

        assert!(verify_response(&reply[..7], 4, 2).is_err());
    }

    #[test]
    fn test_verify_rejects_status_only_reply() {
        // Length 2 = error + checksum, no position bytes
        let mut reply = vec![0xFF, 0xFF, 1, 2, 0];
        reply.push(checksum(&reply[2..]));
        reply.extend_from_slice(&[0, 0]);
        assert!(matches!(
            verify_response(&reply, 1, 2),
            Err(FeetechError::InvalidResponse { .. })
        ));
    }

    #[test]
    fn test_position_to_degrees() {
        assert_eq!(position_to_degrees(0), 0.0);
        assert_eq!(position_to_degrees(MAX_POSITION), 360.0);
        assert!((position_to_degrees(2048) - 180.04).abs() < 0.01);
    }
}
