// Volume descriptor codec (ECMA-119 8). Descriptors are whole 2048-byte
// sectors starting at sector 16; the chain is closed by a terminator.
// Only the primary descriptor carries a body this crate interprets.

use discus_core::{DiscusError, DiscusResult};

use crate::endian::{
    decode_string, decode_u16_both, decode_u32_both, encode_string, encode_u16_both,
    encode_u32_both,
};
use crate::record::DirectoryRecord;
use crate::timestamp::VolumeTimestamp;
use crate::types::SECTOR_SIZE;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// The standard identifier every descriptor carries at bytes 1..6.
pub const STANDARD_IDENTIFIER: &[u8; 5] = b"CD001";

/// Descriptor format version; always 1 for ECMA-119.
pub const DESCRIPTOR_VERSION: u8 = 1;

/// Offset of the embedded root directory record within the descriptor.
const ROOT_RECORD_OFFSET: usize = 156;
const ROOT_RECORD_LEN: usize = 34;
const APPLICATION_USED_LEN: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeDescriptorType {
    BootRecord,
    Primary,
    Supplementary,
    Partition,
    Terminator,
}

impl VolumeDescriptorType {
    pub fn from_byte(b: u8) -> DiscusResult<Self> {
        match b {
            0 => Ok(Self::BootRecord),
            1 => Ok(Self::Primary),
            2 => Ok(Self::Supplementary),
            3 => Ok(Self::Partition),
            255 => Ok(Self::Terminator),
            other => Err(DiscusError::UnknownVolumeType(other)),
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::BootRecord => 0,
            Self::Primary => 1,
            Self::Supplementary => 2,
            Self::Partition => 3,
            Self::Terminator => 255,
        }
    }
}

/// The 7-byte header shared by every descriptor type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeDescriptorHeader {
    pub descriptor_type: VolumeDescriptorType,
    pub identifier: [u8; 5],
    pub version: u8,
}

impl VolumeDescriptorHeader {
    pub const ENCODED_LEN: usize = 7;

    pub fn new(descriptor_type: VolumeDescriptorType) -> Self {
        Self {
            descriptor_type,
            identifier: *STANDARD_IDENTIFIER,
            version: DESCRIPTOR_VERSION,
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.descriptor_type.as_byte());
        out.extend_from_slice(&self.identifier);
        out.push(self.version);
    }

    pub fn decode(buf: &[u8]) -> DiscusResult<Self> {
        if buf.len() < Self::ENCODED_LEN {
            return Err(DiscusError::UnexpectedEof);
        }
        let mut identifier = [0u8; 5];
        identifier.copy_from_slice(&buf[1..6]);
        if identifier != *STANDARD_IDENTIFIER {
            return Err(DiscusError::BadMagic { found: identifier });
        }
        Ok(Self {
            descriptor_type: VolumeDescriptorType::from_byte(buf[0])?,
            identifier,
            version: buf[6],
        })
    }
}

/// Primary volume descriptor body (ECMA-119 8.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryVolumeDescriptor {
    pub system_identifier: String,
    pub volume_identifier: String,
    /// Total size of the volume in sectors.
    pub volume_space_size: u32,
    pub volume_set_size: u16,
    pub volume_sequence_number: u16,
    pub logical_block_size: u16,
    pub path_table_size: u32,
    pub type_l_path_table: u32,
    pub opt_type_l_path_table: u32,
    pub type_m_path_table: u32,
    pub opt_type_m_path_table: u32,
    pub root_record: DirectoryRecord,
    pub volume_set_identifier: String,
    pub publisher_identifier: String,
    pub data_preparer_identifier: String,
    pub application_identifier: String,
    pub copyright_file_identifier: String,
    pub abstract_file_identifier: String,
    pub bibliographic_file_identifier: String,
    pub created_at: VolumeTimestamp,
    pub modified_at: VolumeTimestamp,
    pub expires_at: VolumeTimestamp,
    pub effective_at: VolumeTimestamp,
    pub file_structure_version: u8,
    /// 512 bytes reserved for the application; preserved verbatim.
    pub application_used: Vec<u8>,
}

/// One decoded descriptor sector. Boot records, supplementary descriptors
/// and partition descriptors are recognised so the chain walk can step over
/// them, but their bodies are not interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeDescriptor {
    BootRecord,
    Primary(PrimaryVolumeDescriptor),
    Supplementary,
    Partition,
    Terminator,
}

impl VolumeDescriptor {
    pub fn descriptor_type(&self) -> VolumeDescriptorType {
        match self {
            Self::BootRecord => VolumeDescriptorType::BootRecord,
            Self::Primary(_) => VolumeDescriptorType::Primary,
            Self::Supplementary => VolumeDescriptorType::Supplementary,
            Self::Partition => VolumeDescriptorType::Partition,
            Self::Terminator => VolumeDescriptorType::Terminator,
        }
    }

    /// Encode into a full descriptor sector.
    pub fn encode(&self) -> DiscusResult<Vec<u8>> {
        let mut out = Vec::with_capacity(SECTOR_SIZE as usize);
        VolumeDescriptorHeader::new(self.descriptor_type()).encode(&mut out);

        if let Self::Primary(pvd) = self {
            pvd.encode_body(&mut out)?;
        }

        out.resize(SECTOR_SIZE as usize, 0);
        Ok(out)
    }

    /// Decode a full descriptor sector.
    pub fn decode(sector: &[u8]) -> DiscusResult<Self> {
        if sector.len() < SECTOR_SIZE as usize {
            return Err(DiscusError::UnexpectedEof);
        }
        let header = VolumeDescriptorHeader::decode(sector)?;
        match header.descriptor_type {
            VolumeDescriptorType::BootRecord => Ok(Self::BootRecord),
            VolumeDescriptorType::Supplementary => Ok(Self::Supplementary),
            VolumeDescriptorType::Partition => Ok(Self::Partition),
            VolumeDescriptorType::Terminator => Ok(Self::Terminator),
            VolumeDescriptorType::Primary => Ok(Self::Primary(
                PrimaryVolumeDescriptor::decode_body(sector)?,
            )),
        }
    }
}

impl PrimaryVolumeDescriptor {
    /// Append the body after an already encoded 7-byte header.
    fn encode_body(&self, out: &mut Vec<u8>) -> DiscusResult<()> {
        out.push(0); // unused
        encode_string(out, &self.system_identifier, 32);
        encode_string(out, &self.volume_identifier, 32);
        out.resize(out.len() + 8, 0);
        encode_u32_both(out, self.volume_space_size);
        out.resize(out.len() + 32, 0);
        encode_u16_both(out, self.volume_set_size);
        encode_u16_both(out, self.volume_sequence_number);
        encode_u16_both(out, self.logical_block_size);
        encode_u32_both(out, self.path_table_size);

        let mut path_tables = [0u8; 16];
        LittleEndian::write_u32(&mut path_tables[0..4], self.type_l_path_table);
        LittleEndian::write_u32(&mut path_tables[4..8], self.opt_type_l_path_table);
        BigEndian::write_u32(&mut path_tables[8..12], self.type_m_path_table);
        BigEndian::write_u32(&mut path_tables[12..16], self.opt_type_m_path_table);
        out.extend_from_slice(&path_tables);

        debug_assert_eq!(out.len(), ROOT_RECORD_OFFSET);
        let root = self.root_record.encode()?;
        if root.len() != ROOT_RECORD_LEN {
            return Err(DiscusError::RecordTooLong(root.len()));
        }
        out.extend_from_slice(&root);

        encode_string(out, &self.volume_set_identifier, 128);
        encode_string(out, &self.publisher_identifier, 128);
        encode_string(out, &self.data_preparer_identifier, 128);
        encode_string(out, &self.application_identifier, 128);
        encode_string(out, &self.copyright_file_identifier, 37);
        encode_string(out, &self.abstract_file_identifier, 37);
        encode_string(out, &self.bibliographic_file_identifier, 37);
        self.created_at.encode(out);
        self.modified_at.encode(out);
        self.expires_at.encode(out);
        self.effective_at.encode(out);
        out.push(self.file_structure_version);
        out.push(0);

        debug_assert_eq!(out.len(), 883);
        let mut application_used = self.application_used.clone();
        application_used.resize(APPLICATION_USED_LEN, 0);
        out.extend_from_slice(&application_used);
        Ok(())
    }

    fn decode_body(sector: &[u8]) -> DiscusResult<Self> {
        let root_record = DirectoryRecord::decode(
            &sector[ROOT_RECORD_OFFSET..ROOT_RECORD_OFFSET + ROOT_RECORD_LEN],
        )?
        .ok_or(DiscusError::UnexpectedEof)?;

        Ok(Self {
            system_identifier: decode_string(&sector[8..40]),
            volume_identifier: decode_string(&sector[40..72]),
            volume_space_size: decode_u32_both(&sector[80..88])?,
            volume_set_size: decode_u16_both(&sector[120..124])?,
            volume_sequence_number: decode_u16_both(&sector[124..128])?,
            logical_block_size: decode_u16_both(&sector[128..132])?,
            path_table_size: decode_u32_both(&sector[132..140])?,
            type_l_path_table: LittleEndian::read_u32(&sector[140..144]),
            opt_type_l_path_table: LittleEndian::read_u32(&sector[144..148]),
            type_m_path_table: BigEndian::read_u32(&sector[148..152]),
            opt_type_m_path_table: BigEndian::read_u32(&sector[152..156]),
            root_record,
            volume_set_identifier: decode_string(&sector[190..318]),
            publisher_identifier: decode_string(&sector[318..446]),
            data_preparer_identifier: decode_string(&sector[446..574]),
            application_identifier: decode_string(&sector[574..702]),
            copyright_file_identifier: decode_string(&sector[702..739]),
            abstract_file_identifier: decode_string(&sector[739..776]),
            bibliographic_file_identifier: decode_string(&sector[776..813]),
            created_at: VolumeTimestamp::decode(&sector[813..830])?,
            modified_at: VolumeTimestamp::decode(&sector[830..847])?,
            expires_at: VolumeTimestamp::decode(&sector[847..864])?,
            effective_at: VolumeTimestamp::decode(&sector[864..881])?,
            file_structure_version: sector[881],
            application_used: sector[883..883 + APPLICATION_USED_LEN].to_vec(),
        })
    }
}
