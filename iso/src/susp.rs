// System Use Sharing Protocol decoder (SUSP-112). Entries are tagged,
// length-prefixed blobs in the system-use area of a directory record; a CE
// entry redirects into a continuation area elsewhere on the disc, which is
// read and spliced in transparently.

use discus_core::{DiscusError, DiscusResult, ReadAt};

use crate::endian::decode_u32_both;
use crate::types::SECTOR_SIZE;

pub const TAG_CONTINUATION_AREA: &[u8; 2] = b"CE";
pub const TAG_PADDING_FIELD: &[u8; 2] = b"PD";
pub const TAG_SHARING_PROTOCOL_INDICATOR: &[u8; 2] = b"SP";
pub const TAG_SHARING_PROTOCOL_TERMINATOR: &[u8; 2] = b"ST";
pub const TAG_EXTENSIONS_REFERENCE: &[u8; 2] = b"ER";
pub const TAG_EXTENSION_SELECTOR: &[u8; 2] = b"ES";

/// CE chains are unbounded in the format; cap them so a crafted image
/// cannot recurse forever.
pub const MAX_CONTINUATION_DEPTH: u32 = 32;

/// One system-use entry: two-byte tag, length byte, version byte, payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemUseEntry(Vec<u8>);

impl SystemUseEntry {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn tag(&self) -> &[u8] {
        &self.0[..2]
    }

    pub fn len(&self) -> usize {
        self.0[2] as usize
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn version(&self) -> u8 {
        self.0[3]
    }

    /// Payload after the 4-byte header.
    pub fn data(&self) -> &[u8] {
        &self.0[4..]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// SUSP-112 5.1: redirect into a continuation area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContinuationEntry {
    pub block_location: u32,
    pub offset: u32,
    pub length: u32,
}

impl ContinuationEntry {
    /// A CE entry is exactly 28 bytes: header plus three dual-endian fields.
    pub fn decode(entry: &SystemUseEntry) -> DiscusResult<Self> {
        if entry.len() != 28 || entry.as_bytes().len() != 28 {
            return Err(DiscusError::InvalidSystemUse(format!(
                "continuation area record with length {} instead of 28",
                entry.len()
            )));
        }
        let data = entry.data();
        Ok(Self {
            block_location: decode_u32_both(&data[0..8])?,
            offset: decode_u32_both(&data[8..16])?,
            length: decode_u32_both(&data[16..24])?,
        })
    }
}

/// SUSP-112 5.5: announcement of an extension dialect, e.g. Rock Ridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionRecord {
    pub version: u8,
    pub identifier: String,
    pub descriptor: String,
    pub source: String,
}

impl ExtensionRecord {
    pub fn decode(entry: &SystemUseEntry) -> DiscusResult<Self> {
        if entry.tag() != TAG_EXTENSIONS_REFERENCE {
            return Err(DiscusError::InvalidSystemUse(format!(
                "expected an ER entry, found tag {:?}",
                entry.tag()
            )));
        }
        let data = entry.data();
        if data.len() < 4 {
            return Err(DiscusError::InvalidSystemUse(
                "ER entry shorter than its fixed fields".into(),
            ));
        }
        let id_len = data[0] as usize;
        let descriptor_len = data[1] as usize;
        let source_len = data[2] as usize;
        if 4 + id_len + descriptor_len + source_len > data.len() {
            return Err(DiscusError::InvalidSystemUse(format!(
                "ER entry declares {} bytes of strings but carries {}",
                id_len + descriptor_len + source_len,
                data.len() - 4
            )));
        }

        let identifier_end = 4 + id_len;
        let descriptor_end = identifier_end + descriptor_len;
        Ok(Self {
            version: data[3],
            identifier: String::from_utf8_lossy(&data[4..identifier_end]).into_owned(),
            descriptor: String::from_utf8_lossy(&data[identifier_end..descriptor_end])
                .into_owned(),
            source: String::from_utf8_lossy(&data[descriptor_end..descriptor_end + source_len])
                .into_owned(),
        })
    }
}

/// Split a system-use area into its entries, following CE redirects.
///
/// A trailing region shorter than four bytes is padding and is ignored
/// (SUSP-112 4). An entry whose declared length overruns the remaining
/// buffer is an error.
pub fn split_system_use_entries<R: ReadAt + ?Sized>(
    data: &[u8],
    source: &R,
) -> DiscusResult<Vec<SystemUseEntry>> {
    split_at_depth(data, source, 0)
}

fn split_at_depth<R: ReadAt + ?Sized>(
    mut data: &[u8],
    source: &R,
    depth: u32,
) -> DiscusResult<Vec<SystemUseEntry>> {
    if depth >= MAX_CONTINUATION_DEPTH {
        return Err(DiscusError::TooManyContinuations);
    }

    let mut output = Vec::new();
    while data.len() >= 4 {
        let entry_len = data[2] as usize;
        if entry_len == 0 {
            // zero fill after the last entry of a continuation area
            break;
        }
        if entry_len < 4 {
            return Err(DiscusError::InvalidSystemUse(format!(
                "entry length {entry_len} is shorter than the 4-byte header"
            )));
        }
        if entry_len > data.len() {
            return Err(DiscusError::ShortSystemUse {
                declared: entry_len,
                remaining: data.len(),
            });
        }

        let entry = SystemUseEntry(data[..entry_len].to_vec());
        if entry.tag() == TAG_CONTINUATION_AREA {
            let ce = ContinuationEntry::decode(&entry)?;
            let mut continuation = vec![0u8; ce.length as usize];
            let location = ce.block_location as u64 * SECTOR_SIZE as u64 + ce.offset as u64;
            source.read_exact_at(&mut continuation, location)?;
            output.extend(split_at_depth(&continuation, source, depth + 1)?);
        } else {
            output.push(entry);
        }

        data = &data[entry_len..];
    }

    Ok(output)
}

/// Decode every ER entry in a split system-use area.
pub fn extension_records(entries: &[SystemUseEntry]) -> DiscusResult<Vec<ExtensionRecord>> {
    entries
        .iter()
        .filter(|e| e.tag() == TAG_EXTENSIONS_REFERENCE)
        .map(ExtensionRecord::decode)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endian::encode_u32_both;

    /// Source that errors on every read.
    struct NoSource;

    impl ReadAt for NoSource {
        fn read_at(&self, _buf: &mut [u8], _offset: u64) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::UnexpectedEof.into())
        }
    }

    fn ce_entry(block: u32, offset: u32, length: u32) -> Vec<u8> {
        let mut entry = vec![b'C', b'E', 28, 1];
        encode_u32_both(&mut entry, block);
        encode_u32_both(&mut entry, offset);
        encode_u32_both(&mut entry, length);
        entry
    }

    #[test]
    fn empty_and_padding_tails_are_ignored() {
        let entries = split_system_use_entries(&[], &NoSource).unwrap();
        assert!(entries.is_empty());

        let entries = split_system_use_entries(&[1, 2, 0], &NoSource).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn declared_length_overrun_fails() {
        let err = split_system_use_entries(&[1, 2, 200, 12, 0, 0, 0, 0], &NoSource).unwrap_err();
        assert!(matches!(
            err,
            DiscusError::ShortSystemUse {
                declared: 200,
                remaining: 8
            }
        ));
    }

    #[test]
    fn splits_plain_entries() {
        let mut area = vec![b'N', b'M', 8, 1, 0, b'F', b'O', b'O'];
        area.extend_from_slice(&[b'P', b'D', 5, 1, 0]);
        area.push(0); // sub-4-byte tail

        let entries = split_system_use_entries(&area, &NoSource).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].tag(), b"NM");
        assert_eq!(entries[0].data(), &[0, b'F', b'O', b'O']);
        assert_eq!(entries[1].tag(), b"PD");
    }

    #[test]
    fn ce_must_be_28_bytes() {
        let err = split_system_use_entries(&[b'C', b'E', 7, 1, 0, 0, 0], &NoSource).unwrap_err();
        assert!(matches!(err, DiscusError::InvalidSystemUse(_)));
    }

    #[test]
    fn ce_field_mismatches_are_reported_per_field() {
        // block location halves disagree
        let mut entry = vec![b'C', b'E', 28, 1];
        entry.extend_from_slice(&[100, 0, 0, 0, 0, 0, 0, 99]);
        entry.extend_from_slice(&[0u8; 16]);
        assert!(matches!(
            split_system_use_entries(&entry, &NoSource),
            Err(DiscusError::EndianMismatch { lsb: 100, msb: 99 })
        ));
    }

    #[test]
    fn zero_padding_terminates_the_area() {
        let mut area = vec![b'N', b'M', 8, 1, 0, b'F', b'O', b'O'];
        area.extend_from_slice(&[0u8; 56]);

        let entries = split_system_use_entries(&area, &NoSource).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].tag(), b"NM");
    }

    #[test]
    fn ce_redirects_into_continuation_area() {
        // continuation area at sector 1, offset 0, 64 bytes long
        let mut image = vec![0u8; 3 * SECTOR_SIZE as usize];
        image[SECTOR_SIZE as usize..SECTOR_SIZE as usize + 8]
            .copy_from_slice(&[b'N', b'M', 8, 1, 0, b'F', b'O', b'O']);

        let area = ce_entry(1, 0, 64);
        let entries = split_system_use_entries(&area, image.as_slice()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].tag(), b"NM");
        assert_eq!(entries[0].data(), &[0, b'F', b'O', b'O']);
    }

    #[test]
    fn ce_read_failure_propagates() {
        let area = ce_entry(100, 12, 64);
        assert!(matches!(
            split_system_use_entries(&area, &NoSource),
            Err(DiscusError::Io(_))
        ));
    }

    #[test]
    fn ce_loop_hits_recursion_cap() {
        // sector 1 contains a CE pointing back at itself
        let mut image = vec![0u8; 2 * SECTOR_SIZE as usize];
        let looped = ce_entry(1, 0, 28);
        image[SECTOR_SIZE as usize..SECTOR_SIZE as usize + looped.len()]
            .copy_from_slice(&looped);

        assert!(matches!(
            split_system_use_entries(&looped, image.as_slice()),
            Err(DiscusError::TooManyContinuations)
        ));
    }

    #[test]
    fn er_decode_rejects_invalid() {
        for bytes in [
            vec![b'S', b'T', 4, 1],
            vec![b'E', b'R', 4, 1],
            vec![b'E', b'R', 8, 1, 3, 0, 0, 0],
            vec![b'E', b'R', 10, 1, 3, 0, 0, 0, b'F', b'O'],
            vec![
                b'E', b'R', 14, 1, 3, 4, 0, 0, b'F', b'O', b'O', b'D', b'E', b'S',
            ],
            vec![
                b'E', b'R', 17, 1, 3, 4, 3, 0, b'F', b'O', b'O', b'D', b'E', b'S', b'C', b'S',
                b'R',
            ],
        ] {
            let entry = SystemUseEntry::from_bytes(bytes);
            assert!(ExtensionRecord::decode(&entry).is_err());
        }
    }

    #[test]
    fn er_decode_accepts_valid() {
        for bytes in [
            vec![b'E', b'R', 8, 1, 0, 0, 0, 0],
            vec![b'E', b'R', 11, 1, 3, 0, 0, 0, b'F', b'O', b'O'],
            vec![
                b'E', b'R', 15, 1, 3, 4, 0, 0, b'F', b'O', b'O', b'D', b'E', b'S', b'C',
            ],
            vec![
                b'E', b'R', 18, 1, 3, 4, 3, 0, b'F', b'O', b'O', b'D', b'E', b'S', b'C', b'S',
                b'R', b'C',
            ],
        ] {
            let entry = SystemUseEntry::from_bytes(bytes);
            ExtensionRecord::decode(&entry).unwrap();
        }
    }

    #[test]
    fn er_fields_are_extracted() {
        let entry = SystemUseEntry::from_bytes(vec![
            b'E', b'R', 18, 1, 3, 4, 3, 7, b'F', b'O', b'O', b'D', b'E', b'S', b'C', b'S', b'R',
            b'C',
        ]);
        let er = ExtensionRecord::decode(&entry).unwrap();
        assert_eq!(er.identifier, "FOO");
        assert_eq!(er.descriptor, "DESC");
        assert_eq!(er.source, "SRC");
        assert_eq!(er.version, 7);
    }
}
