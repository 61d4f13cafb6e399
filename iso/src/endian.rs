// Both-byte-orders integer codec (ECMA-119 7.2.3 / 7.3.3) and fixed-width
// space-padded strings. Every multi-byte field of the format is stored
// twice, little-endian first, and both copies must agree on decode.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use discus_core::{DiscusError, DiscusResult};

pub fn encode_u16_both(out: &mut Vec<u8>, n: u16) {
    let mut field = [0u8; 4];
    LittleEndian::write_u16(&mut field[0..2], n);
    BigEndian::write_u16(&mut field[2..4], n);
    out.extend_from_slice(&field);
}

pub fn encode_u32_both(out: &mut Vec<u8>, n: u32) {
    let mut field = [0u8; 8];
    LittleEndian::write_u32(&mut field[0..4], n);
    BigEndian::write_u32(&mut field[4..8], n);
    out.extend_from_slice(&field);
}

pub fn decode_u16_both(buf: &[u8]) -> DiscusResult<u16> {
    if buf.len() < 4 {
        return Err(DiscusError::UnexpectedEof);
    }
    let lsb = LittleEndian::read_u16(&buf[0..2]);
    let msb = BigEndian::read_u16(&buf[2..4]);
    if lsb != msb {
        return Err(DiscusError::EndianMismatch {
            lsb: lsb as u64,
            msb: msb as u64,
        });
    }
    Ok(lsb)
}

pub fn decode_u32_both(buf: &[u8]) -> DiscusResult<u32> {
    if buf.len() < 8 {
        return Err(DiscusError::UnexpectedEof);
    }
    let lsb = LittleEndian::read_u32(&buf[0..4]);
    let msb = BigEndian::read_u32(&buf[4..8]);
    if lsb != msb {
        return Err(DiscusError::EndianMismatch {
            lsb: lsb as u64,
            msb: msb as u64,
        });
    }
    Ok(lsb)
}

/// Emit `s` into a field of exactly `width` bytes, right-padded with 0x20.
/// Overlong input is cut at the field width without complaint, matching how
/// mastering tools treat identifier fields.
pub fn encode_string(out: &mut Vec<u8>, s: &str, width: usize) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(width);
    out.extend_from_slice(&bytes[..n]);
    out.resize(out.len() + width - n, b' ');
}

/// Read a fixed-width field back, dropping the space padding.
pub fn decode_string(buf: &[u8]) -> String {
    let trimmed = match buf.iter().rposition(|&b| b != b' ') {
        Some(last) => &buf[..=last],
        None => &[][..],
    };
    String::from_utf8_lossy(trimmed).into_owned()
}
