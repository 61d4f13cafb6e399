// Directory record codec (ECMA-119 9.1). Records are variable length and
// never straddle a sector boundary; a zero length byte inside a directory
// extent means "no further records in this sector".

use discus_core::{DiscusError, DiscusResult};

use crate::endian::{decode_u16_both, decode_u32_both, encode_u16_both, encode_u32_both};
use crate::timestamp::RecordingTimestamp;

// File flag bits (ECMA-119 9.1.6).
pub const FILE_FLAG_HIDDEN: u8 = 0x01;
pub const FILE_FLAG_DIRECTORY: u8 = 0x02;
pub const FILE_FLAG_ASSOCIATED: u8 = 0x04;
pub const FILE_FLAG_RECORD: u8 = 0x08;
pub const FILE_FLAG_PROTECTION: u8 = 0x10;
pub const FILE_FLAG_MULTI_EXTENT: u8 = 0x80;

/// Identifier of the `.` entry heading every directory extent.
pub const SELF_IDENTIFIER: &str = "\u{0}";
/// Identifier of the `..` entry.
pub const PARENT_IDENTIFIER: &str = "\u{1}";

/// Fixed header bytes before the identifier.
const HEADER_LEN: usize = 33;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryRecord {
    pub extended_attribute_len: u8,
    /// First sector of the extent this record describes.
    pub extent_location: u32,
    /// Extent size in bytes; on disc the extent occupies whole sectors.
    pub extent_length: u32,
    pub recorded_at: RecordingTimestamp,
    pub file_flags: u8,
    pub file_unit_size: u8,
    pub interleave_gap: u8,
    pub volume_sequence_number: u16,
    pub identifier: String,
    pub system_use: Vec<u8>,
}

impl DirectoryRecord {
    pub fn is_directory(&self) -> bool {
        self.file_flags & FILE_FLAG_DIRECTORY != 0
    }

    /// Length of the encoded record. The pad byte keeps the span up to and
    /// including the identifier odd, so the system-use area starts on an
    /// even offset.
    pub fn encoded_len(&self) -> usize {
        encoded_len_for(self.identifier.len()) + self.system_use.len()
    }

    pub fn encode(&self) -> DiscusResult<Vec<u8>> {
        let total = self.encoded_len();
        if total > 255 {
            return Err(DiscusError::RecordTooLong(total));
        }

        let id_bytes = self.identifier.as_bytes();
        let mut out = Vec::with_capacity(total);
        out.push(total as u8);
        out.push(self.extended_attribute_len);
        encode_u32_both(&mut out, self.extent_location);
        encode_u32_both(&mut out, self.extent_length);
        self.recorded_at.encode(&mut out)?;
        out.push(self.file_flags);
        out.push(self.file_unit_size);
        out.push(self.interleave_gap);
        encode_u16_both(&mut out, self.volume_sequence_number);
        out.push(id_bytes.len() as u8);
        out.extend_from_slice(id_bytes);
        if id_bytes.len() % 2 == 0 {
            out.push(0);
        }
        out.extend_from_slice(&self.system_use);

        debug_assert_eq!(out.len(), total);
        Ok(out)
    }

    /// Decode one record from the start of `buf`. `Ok(None)` is the
    /// sector-padding sentinel: a zero length byte or a zero-length
    /// identifier, meaning the remaining bytes of this sector hold no
    /// further records.
    pub fn decode(buf: &[u8]) -> DiscusResult<Option<Self>> {
        if buf.is_empty() {
            return Err(DiscusError::UnexpectedEof);
        }
        let total = buf[0] as usize;
        if total == 0 {
            return Ok(None);
        }
        if total < HEADER_LEN + 1 || buf.len() < total {
            return Err(DiscusError::UnexpectedEof);
        }

        let id_len = buf[32] as usize;
        if id_len == 0 {
            return Ok(None);
        }
        let pad = (id_len + 1) % 2;
        let system_use_start = HEADER_LEN + id_len + pad;
        if system_use_start > total {
            return Err(DiscusError::UnexpectedEof);
        }

        Ok(Some(Self {
            extended_attribute_len: buf[1],
            extent_location: decode_u32_both(&buf[2..10])?,
            extent_length: decode_u32_both(&buf[10..18])?,
            recorded_at: RecordingTimestamp::decode(&buf[18..25])?,
            file_flags: buf[25],
            file_unit_size: buf[26],
            interleave_gap: buf[27],
            volume_sequence_number: decode_u16_both(&buf[28..32])?,
            identifier: String::from_utf8_lossy(&buf[33..33 + id_len]).into_owned(),
            system_use: buf[system_use_start..total].to_vec(),
        }))
    }
}

/// Encoded size of a record with an identifier of `id_len` bytes and no
/// system-use area. The writer's sector-packing arithmetic must agree with
/// `encode` byte for byte, so both go through this.
pub fn encoded_len_for(id_len: usize) -> usize {
    HEADER_LEN + id_len + (id_len + 1) % 2
}
