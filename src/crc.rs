//! CRC-16/MODBUS: reflected polynomial `0xA001`, initial value `0xFFFF`,
//! no final xor. On the wire the checksum is sent low byte first.

const POLYNOMIAL: u16 = 0xA001;
const INITIAL: u16 = 0xFFFF;

/// Number of checksum bytes trailing every frame.
pub const CRC_LENGTH: usize = 2;

pub fn checksum(data: &[u8]) -> u16 {
    let mut crc = INITIAL;
    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ POLYNOMIAL;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Appends the checksum of `frame` to itself, low byte first.
pub fn append(frame: &mut Vec<u8>) {
    let crc = checksum(frame);
    frame.extend_from_slice(&crc.to_le_bytes());
}

/// Splits a frame into its payload and the little-endian checksum it carries.
///
/// Returns `None` when the frame is too short to hold a checksum.
pub fn split(frame: &[u8]) -> Option<(&[u8], u16)> {
    if frame.len() < CRC_LENGTH {
        return None;
    }
    let (payload, crc) = frame.split_at(frame.len() - CRC_LENGTH);
    Some((payload, u16::from_le_bytes([crc[0], crc[1]])))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_vectors() {
        assert_eq!(checksum(b"123456789"), 0x4B37);
        assert_eq!(checksum(&[0x00]), 0x40BF);
        assert_eq!(checksum(&[]), 0xFFFF);
    }

    #[test]
    fn append_is_low_byte_first() {
        let mut frame = vec![0x01, 0x04, 0x00, 0x34, 0x00, 0x01];
        append(&mut frame);
        assert_eq!(frame, [0x01, 0x04, 0x00, 0x34, 0x00, 0x01, 0x70, 0x04]);
    }

    #[test]
    fn split_frame() {
        let frame = [0x01, 0x04, 0x02, 0x00, 0x0B, 0xF8, 0xF7];
        let (payload, crc) = split(&frame).unwrap();
        assert_eq!(payload, &frame[..5]);
        assert_eq!(crc, 0xF7F8);
        assert_eq!(checksum(payload), crc);

        assert!(split(&[0x01]).is_none());
    }
}
