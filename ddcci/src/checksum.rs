/*!
DDC/CI XOR checksum.

The checksum is an XOR over every frame byte, seeded with the 8-bit I2C
address byte of the transfer. Because the seed carries the read/write bit, a
frame checked against the wrong direction fails validation.
*/

use crate::address::BusAddress;

/// Transfer direction of a frame on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Write,
    Read,
}

/// Initial XOR accumulator for a frame sent to or read from `address`
pub fn seed(address: BusAddress, direction: Direction) -> u8 {
    let base = address.get() << 1;
    match direction {
        Direction::Write => base,
        Direction::Read => base | 1,
    }
}

/// XOR `bytes` together starting from `seed`
pub fn checksum(bytes: &[u8], seed: u8) -> u8 {
    bytes.iter().fold(seed, |acc, &b| acc ^ b)
}

/// Check a complete frame whose last byte is its checksum
pub fn verify(frame: &[u8], seed: u8) -> bool {
    match frame.split_last() {
        Some((&received, body)) => checksum(body, seed) == received,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_direction_bit() {
        let addr = BusAddress::new(0x37).unwrap();
        assert_eq!(seed(addr, Direction::Write), 0x6E);
        assert_eq!(seed(addr, Direction::Read), 0x6F);
    }

    #[test]
    fn test_seeds_distinct_for_all_addresses() {
        for raw in 0..=BusAddress::MAX {
            let addr = BusAddress::new(raw).unwrap();
            assert_ne!(seed(addr, Direction::Write), seed(addr, Direction::Read));
        }
    }

    #[test]
    fn test_checksum_known_value() {
        // write(0x10, 50) at 0x37
        let body = [0x51, 0x84, 0x03, 0x10, 0x00, 0x32];
        assert_eq!(checksum(&body, 0x6E), 0x9A);
        assert_eq!(checksum(&[], 0x6E), 0x6E);
    }

    #[test]
    fn test_verify_rejects_wrong_direction() {
        let addr = BusAddress::new(0x37).unwrap();
        let mut frame = vec![0x51, 0x82, 0x01, 0x10];
        frame.push(checksum(&frame, seed(addr, Direction::Write)));

        assert!(verify(&frame, seed(addr, Direction::Write)));
        assert!(!verify(&frame, seed(addr, Direction::Read)));
        assert!(!verify(&[], 0));
    }
}
