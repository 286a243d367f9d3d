//! Little-endian integer pack/unpack primitives.
//!
//! The wire protocol encodes all integers little-endian, unsigned, fixed
//! width: 4 bytes for handshake fields and frame lengths, 8 bytes for query
//! tokens.

use crate::error::{Error, Result};

/// Append a 4-byte little-endian unsigned integer.
#[inline]
pub fn put_u32_le(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// Append an 8-byte little-endian unsigned integer.
#[inline]
pub fn put_u64_le(buf: &mut Vec<u8>, value: u64) {
    buf.extend_from_slice(&value.to_le_bytes());
}

/// Read a 4-byte little-endian unsigned integer from the start of `data`.
#[inline]
pub fn get_u32_le(data: &[u8]) -> Result<u32> {
    if data.len() < 4 {
        return Err(Error::driver(format!(
            "get_u32_le: buffer too short: {} < 4",
            data.len()
        )));
    }
    Ok(u32::from_le_bytes([data[0], data[1], data[2], data[3]]))
}

/// Read an 8-byte little-endian unsigned integer from the start of `data`.
#[inline]
pub fn get_u64_le(data: &[u8]) -> Result<u64> {
    if data.len() < 8 {
        return Err(Error::driver(format!(
            "get_u64_le: buffer too short: {} < 8",
            data.len()
        )));
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[..8]);
    Ok(u64::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u32_round_trip() {
        for value in [0u32, 1, 0xdead_beef, u32::MAX] {
            let mut buf = Vec::new();
            put_u32_le(&mut buf, value);
            assert_eq!(buf.len(), 4);
            assert_eq!(get_u32_le(&buf).unwrap(), value);
        }
    }

    #[test]
    fn test_u64_round_trip() {
        for value in [0u64, 1, 1 << 33, u64::MAX] {
            let mut buf = Vec::new();
            put_u64_le(&mut buf, value);
            assert_eq!(buf.len(), 8);
            assert_eq!(get_u64_le(&buf).unwrap(), value);
        }
    }

    #[test]
    fn test_little_endian_layout() {
        let mut buf = Vec::new();
        put_u32_le(&mut buf, 0x0403_0201);
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn test_short_buffer() {
        assert!(get_u32_le(&[1, 2, 3]).is_err());
        assert!(get_u64_le(&[1, 2, 3, 4, 5, 6, 7]).is_err());
    }
}
