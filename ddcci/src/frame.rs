/*!
Frame construction and reply validation.

Outgoing frames are `[MAGIC_1, MAGIC_2 | len, payload..., checksum]`. Replies
arrive in three pieces (ack byte, length byte, payload + checksum) because the
length must be known before the rest can be read off the bus.
*/

use crate::address::BusAddress;
use crate::checksum::{self, Direction};
use crate::error::ProtocolError;
use crate::protocol::{
    DDCCI_COMMAND_READ, DDCCI_COMMAND_WRITE, DDCCI_REPLY_READ, MAGIC_1, MAGIC_2, MAX_DATA_LENGTH,
};
use serde::{Deserialize, Serialize};

/// A complete, checksum-terminated outgoing frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Vec<u8>,
}

impl Frame {
    fn build(address: BusAddress, direction: Direction, payload: &[u8]) -> Self {
        debug_assert!(payload.len() <= MAX_DATA_LENGTH);

        let mut bytes = Vec::with_capacity(payload.len() + 3);
        bytes.push(MAGIC_1);
        bytes.push(MAGIC_2 | payload.len() as u8);
        bytes.extend_from_slice(payload);
        bytes.push(checksum::checksum(&bytes, checksum::seed(address, direction)));

        Self { bytes }
    }

    /// Raw wire bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Payload between the length byte and the checksum
    pub fn payload(&self) -> &[u8] {
        &self.bytes[2..self.bytes.len() - 1]
    }

    /// Trailing checksum byte
    pub fn checksum(&self) -> u8 {
        self.bytes[self.bytes.len() - 1]
    }

    /// Space separated hex dump for logging
    pub fn to_hex(&self) -> String {
        hex_dump(&self.bytes)
    }
}

pub(crate) fn hex_dump(bytes: &[u8]) -> String {
    bytes.iter().map(|b| hex::encode([*b])).collect::<Vec<_>>().join(" ")
}

/// Frame setting `control` to `value`
pub fn build_write(address: BusAddress, control: u8, value: u16) -> Frame {
    let [hi, lo] = value.to_be_bytes();
    Frame::build(
        address,
        Direction::Write,
        &[DDCCI_COMMAND_WRITE, control, hi, lo],
    )
}

/// Frame requesting the current and maximum value of `control`
pub fn build_read(address: BusAddress, control: u8) -> Frame {
    Frame::build(address, Direction::Read, &[DDCCI_COMMAND_READ, control])
}

/// Value reported by the display for one control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadResult {
    pub value: u16,
    pub max_value: u16,
}

/// How to treat a reply length byte without the `0x80` flag bit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthPolicy {
    /// Missing flag is a malformed length
    #[default]
    Strict,
    /// Mask the flag off and carry on
    Permissive,
}

/// Ack byte a display answers with: its address with the read bit set
pub fn expected_ack(address: BusAddress) -> u8 {
    checksum::seed(address, Direction::Read)
}

/// Validate the ack byte of a reply
pub fn check_ack(address: BusAddress, raw_ack: u8) -> Result<(), ProtocolError> {
    let expected = expected_ack(address);
    if raw_ack != expected {
        return Err(ProtocolError::AckInvalid { expected, received: raw_ack });
    }
    Ok(())
}

/// Decode the payload length announced by a reply length byte
pub fn decode_length(raw_length_byte: u8, policy: LengthPolicy) -> Result<usize, ProtocolError> {
    if policy == LengthPolicy::Strict && raw_length_byte & MAGIC_2 == 0 {
        return Err(ProtocolError::MalformedLength(raw_length_byte));
    }

    let data_length = (raw_length_byte & !MAGIC_2) as usize;
    if data_length > MAX_DATA_LENGTH {
        return Err(ProtocolError::MalformedLength(raw_length_byte));
    }
    Ok(data_length)
}

/// Validate a reply to a read request for `control`, strict length policy
pub fn parse_response(
    address: BusAddress,
    control: u8,
    raw_ack: u8,
    raw_length_byte: u8,
    raw_tail: &[u8],
) -> Result<ReadResult, ProtocolError> {
    parse_response_with(
        LengthPolicy::Strict,
        address,
        control,
        raw_ack,
        raw_length_byte,
        raw_tail,
    )
}

/// Validate a reply to a read request for `control`
///
/// Checks run in wire order: ack, length, completeness, checksum, reply
/// type, control code, then value extraction. The first failure wins.
pub fn parse_response_with(
    policy: LengthPolicy,
    address: BusAddress,
    control: u8,
    raw_ack: u8,
    raw_length_byte: u8,
    raw_tail: &[u8],
) -> Result<ReadResult, ProtocolError> {
    check_ack(address, raw_ack)?;
    let data_length = decode_length(raw_length_byte, policy)?;

    let needed = data_length + 1;
    let tail = raw_tail
        .get(..needed)
        .ok_or(ProtocolError::TruncatedResponse { needed, available: raw_tail.len() })?;
    let (&received, data) = tail
        .split_last()
        .ok_or(ProtocolError::TruncatedResponse { needed, available: 0 })?;

    let xor = checksum::checksum(
        &[MAGIC_1, MAGIC_2 | data_length as u8],
        checksum::seed(address, Direction::Read),
    );
    let computed = checksum::checksum(data, xor);
    if computed != received {
        return Err(ProtocolError::ChecksumError { computed, received });
    }

    let byte = |i: usize| {
        data.get(i).copied().ok_or(ProtocolError::TruncatedResponse {
            needed: i + 2,
            available: tail.len(),
        })
    };

    let reply_type = byte(0)?;
    if reply_type != DDCCI_REPLY_READ {
        return Err(ProtocolError::UnexpectedReplyType(reply_type));
    }

    let reply_control = byte(2)?;
    if reply_control != control {
        return Err(ProtocolError::ControlMismatch { requested: control, received: reply_control });
    }

    let max_value = u16::from_be_bytes([byte(4)?, byte(5)?]);
    let value = u16::from_be_bytes([byte(6)?, byte(7)?]);

    Ok(ReadResult { value, max_value })
}

/// Wire image of a well-formed reply: `[ack, len, payload..., checksum]`
#[cfg(test)]
pub(crate) fn reply_bytes(address: BusAddress, payload: &[u8]) -> Vec<u8> {
    let mut bytes = vec![expected_ack(address), MAGIC_2 | payload.len() as u8];
    bytes.extend_from_slice(payload);
    let xor = checksum::checksum(
        &[MAGIC_1, MAGIC_2 | payload.len() as u8],
        checksum::seed(address, Direction::Read),
    );
    bytes.push(checksum::checksum(payload, xor));
    bytes
}

/// Reply payload reporting `value` out of `max_value` for `control`
#[cfg(test)]
pub(crate) fn reply_payload(control: u8, max_value: u16, value: u16) -> Vec<u8> {
    let [max_hi, max_lo] = max_value.to_be_bytes();
    let [val_hi, val_lo] = value.to_be_bytes();
    vec![DDCCI_REPLY_READ, 0x00, control, 0x00, max_hi, max_lo, val_hi, val_lo]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> BusAddress {
        BusAddress::new(0x37).unwrap()
    }

    fn parse(reply: &[u8], control: u8) -> Result<ReadResult, ProtocolError> {
        parse_response(addr(), control, reply[0], reply[1], &reply[2..])
    }

    #[test]
    fn test_build_write_exact_bytes() {
        let frame = build_write(addr(), 0x10, 50);
        assert_eq!(frame.as_bytes(), &[0x51, 0x84, 0x03, 0x10, 0x00, 0x32, 0x9A]);
        assert_eq!(frame.payload(), &[0x03, 0x10, 0x00, 0x32]);
        assert_eq!(frame.checksum(), 0x9A);
        assert_eq!(frame.to_hex(), "51 84 03 10 00 32 9a");
    }

    #[test]
    fn test_build_read_uses_read_seed() {
        let frame = build_read(addr(), 0x10);
        assert_eq!(frame.as_bytes(), &[0x51, 0x82, 0x01, 0x10, 0xAD]);
        assert!(checksum::verify(frame.as_bytes(), 0x6F));
        assert!(!checksum::verify(frame.as_bytes(), 0x6E));
    }

    #[test]
    fn test_built_frames_carry_their_checksum() {
        for raw in [0x00, 0x37, 0x50, 0x7F] {
            let address = BusAddress::new(raw).unwrap();
            for (control, value) in [(0x10, 0u16), (0x12, 0xFFFF), (0xDF, 0x1234)] {
                let frame = build_write(address, control, value);
                let seed = checksum::seed(address, Direction::Write);
                assert!(checksum::verify(frame.as_bytes(), seed));
                assert_eq!(frame.as_bytes()[1] & !MAGIC_2, frame.payload().len() as u8);
            }
        }
    }

    #[test]
    fn test_parse_valid_reply() {
        let reply = reply_bytes(addr(), &reply_payload(0x10, 100, 50));
        assert_eq!(parse(&reply, 0x10), Ok(ReadResult { value: 50, max_value: 100 }));

        let reply = reply_bytes(addr(), &reply_payload(0x12, 0x0102, 0x0304));
        assert_eq!(parse(&reply, 0x12), Ok(ReadResult { value: 0x0304, max_value: 0x0102 }));
    }

    #[test]
    fn test_parse_rejects_bad_ack() {
        let mut reply = reply_bytes(addr(), &reply_payload(0x10, 100, 50));
        reply[0] = 0x6E;
        assert_eq!(
            parse(&reply, 0x10),
            Err(ProtocolError::AckInvalid { expected: 0x6F, received: 0x6E })
        );
    }

    #[test]
    fn test_any_bit_flip_in_body_fails_checksum() {
        let reply = reply_bytes(addr(), &reply_payload(0x10, 100, 50));
        for index in 2..reply.len() {
            for bit in 0..8 {
                let mut corrupted = reply.clone();
                corrupted[index] ^= 1 << bit;
                assert!(
                    matches!(parse(&corrupted, 0x10), Err(ProtocolError::ChecksumError { .. })),
                    "flip of bit {} in byte {} was not caught",
                    bit,
                    index
                );
            }
        }
    }

    #[test]
    fn test_control_mismatch_with_valid_checksum() {
        let reply = reply_bytes(addr(), &reply_payload(0x12, 100, 50));
        assert_eq!(
            parse(&reply, 0x10),
            Err(ProtocolError::ControlMismatch { requested: 0x10, received: 0x12 })
        );
    }

    #[test]
    fn test_unexpected_reply_type() {
        let mut payload = reply_payload(0x10, 100, 50);
        payload[0] = DDCCI_COMMAND_WRITE;
        let reply = reply_bytes(addr(), &payload);
        assert_eq!(
            parse(&reply, 0x10),
            Err(ProtocolError::UnexpectedReplyType(DDCCI_COMMAND_WRITE))
        );
    }

    #[test]
    fn test_length_larger_than_available_is_truncated() {
        let mut reply = reply_bytes(addr(), &reply_payload(0x10, 100, 50));
        reply[1] = MAGIC_2 | 20;
        assert_eq!(
            parse(&reply, 0x10),
            Err(ProtocolError::TruncatedResponse { needed: 21, available: 9 })
        );
    }

    #[test]
    fn test_short_payload_with_valid_checksum_is_truncated() {
        let mut payload = reply_payload(0x10, 100, 50);
        payload.truncate(5);
        let reply = reply_bytes(addr(), &payload);
        assert!(matches!(parse(&reply, 0x10), Err(ProtocolError::TruncatedResponse { .. })));

        let reply = reply_bytes(addr(), &[]);
        assert!(matches!(parse(&reply, 0x10), Err(ProtocolError::TruncatedResponse { .. })));
    }

    #[test]
    fn test_empty_tail_is_truncated() {
        assert_eq!(
            parse_response(addr(), 0x10, 0x6F, MAGIC_2, &[]),
            Err(ProtocolError::TruncatedResponse { needed: 1, available: 0 })
        );
    }

    #[test]
    fn test_oversized_length_is_malformed() {
        assert_eq!(decode_length(MAGIC_2 | 32, LengthPolicy::Strict), Ok(32));
        assert_eq!(
            decode_length(MAGIC_2 | 33, LengthPolicy::Strict),
            Err(ProtocolError::MalformedLength(0xA1))
        );
        assert_eq!(
            decode_length(0x7F, LengthPolicy::Permissive),
            Err(ProtocolError::MalformedLength(0x7F))
        );
    }

    #[test]
    fn test_missing_length_flag_depends_on_policy() {
        let mut reply = reply_bytes(addr(), &reply_payload(0x10, 100, 50));
        reply[1] &= !MAGIC_2;

        assert_eq!(parse(&reply, 0x10), Err(ProtocolError::MalformedLength(0x08)));

        let lenient = parse_response_with(
            LengthPolicy::Permissive,
            addr(),
            0x10,
            reply[0],
            reply[1],
            &reply[2..],
        );
        assert_eq!(lenient, Ok(ReadResult { value: 50, max_value: 100 }));
    }

    #[test]
    fn test_read_result_json() {
        let json = serde_json::to_string(&ReadResult { value: 50, max_value: 100 }).unwrap();
        assert_eq!(json, r#"{"value":50,"max_value":100}"#);

        let policy: LengthPolicy = serde_json::from_str(r#""permissive""#).unwrap();
        assert_eq!(policy, LengthPolicy::Permissive);
    }
}
