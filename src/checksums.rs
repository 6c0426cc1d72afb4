// src/checksums.rs
//
// CRC-16/Modbus used to seal and verify Modbus RTU frames.

/// Reflected form of the Modbus polynomial 0x8005.
const CRC16_MODBUS_POLY_REFLECTED: u16 = 0xA001;

/// CRC-16 Modbus (polynomial 0x8005, reflected, init 0xFFFF, no final XOR).
pub fn crc16_modbus_checksum(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ CRC16_MODBUS_POLY_REFLECTED;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Append the CRC-16 Modbus to `data`, low byte first as it goes on the wire.
pub fn append_modbus_crc(data: &[u8]) -> Vec<u8> {
    let crc = crc16_modbus_checksum(data);
    let mut result = Vec::with_capacity(data.len() + 2);
    result.extend_from_slice(data);
    result.push((crc & 0xFF) as u8);
    result.push((crc >> 8) as u8);
    result
}

/// Check the trailing CRC of a complete RTU frame (address .. CRC).
pub fn validate_modbus_crc(frame: &[u8]) -> bool {
    if frame.len() < 4 {
        return false;
    }
    let (body, crc) = frame.split_at(frame.len() - 2);
    let received = (crc[0] as u16) | ((crc[1] as u16) << 8);
    crc16_modbus_checksum(body) == received
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_modbus_checksum_test_vector() {
        // Read 10 holding registers from unit 1 at address 0.
        // Wire format of the CRC is C5 CD (little-endian).
        let data = [0x01, 0x03, 0x00, 0x00, 0x00, 0x0A];
        assert_eq!(crc16_modbus_checksum(&data), 0xCDC5);
    }

    #[test]
    fn test_crc16_modbus_checksum_empty() {
        assert_eq!(crc16_modbus_checksum(&[]), 0xFFFF);
    }

    #[test]
    fn test_append_modbus_crc_is_little_endian() {
        let frame = append_modbus_crc(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x0A]);
        assert_eq!(&frame[6..], &[0xC5, 0xCD]);
        assert!(validate_modbus_crc(&frame));
    }

    #[test]
    fn test_validate_modbus_crc_rejects_corruption() {
        let mut frame = append_modbus_crc(&[0x01, 0x03, 0x04, 0x00, 0x0A, 0x00, 0x14]);
        assert!(validate_modbus_crc(&frame));
        frame[3] ^= 0xFF;
        assert!(!validate_modbus_crc(&frame));
    }

    #[test]
    fn test_validate_modbus_crc_too_short() {
        assert!(!validate_modbus_crc(&[0x01, 0x03, 0x00]));
    }
}
