// Image reader: walks the volume descriptor chain at open, then exposes the
// directory tree lazily. Children are materialised per call from the
// directory's extent; nothing is cached, so a failed enumeration can simply
// be retried.

use std::io::{self, Read};

use chrono::{DateTime, FixedOffset};
use discus_core::{DiscusError, DiscusResult, ReadAt};
use log::{debug, info};

use crate::record::{DirectoryRecord, PARENT_IDENTIFIER, SELF_IDENTIFIER};
use crate::rock_ridge;
use crate::susp::{split_system_use_entries, SystemUseEntry};
use crate::types::{PVD_SECTOR, SECTOR_SIZE};
use crate::volume::{PrimaryVolumeDescriptor, VolumeDescriptor, VolumeDescriptorType};

/// A parsed image over a borrowed random-access source.
pub struct Image<R: ReadAt> {
    source: R,
    descriptors: Vec<VolumeDescriptor>,
    primary: PrimaryVolumeDescriptor,
}

impl<R: ReadAt> Image<R> {
    /// Read the descriptor chain from sector 16 until the terminator.
    pub fn open(source: R) -> DiscusResult<Self> {
        let mut descriptors = Vec::new();
        let mut sector_buf = vec![0u8; SECTOR_SIZE as usize];
        let mut sector = PVD_SECTOR;

        loop {
            source.read_exact_at(&mut sector_buf, sector as u64 * SECTOR_SIZE as u64)?;
            let descriptor = VolumeDescriptor::decode(&sector_buf)?;
            debug!(
                "sector {sector}: {:?} volume descriptor",
                descriptor.descriptor_type()
            );
            let done = descriptor.descriptor_type() == VolumeDescriptorType::Terminator;
            descriptors.push(descriptor);
            if done {
                break;
            }
            sector += 1;
        }

        let primary = descriptors
            .iter()
            .find_map(|d| match d {
                VolumeDescriptor::Primary(pvd) => Some(pvd.clone()),
                _ => None,
            })
            .ok_or(DiscusError::NoPrimaryVolume)?;

        info!(
            "opened ISO 9660 image: volume {:?}, {} sectors",
            primary.volume_identifier, primary.volume_space_size
        );

        Ok(Self {
            source,
            descriptors,
            primary,
        })
    }

    /// Every descriptor found before (and including) the terminator.
    pub fn descriptors(&self) -> &[VolumeDescriptor] {
        &self.descriptors
    }

    pub fn primary(&self) -> &PrimaryVolumeDescriptor {
        &self.primary
    }

    /// The root directory as a file node.
    pub fn root_dir(&self) -> DiscusResult<File<'_, R>> {
        let record = self.primary.root_record.clone();
        let susp_entries = split_system_use_entries(&record.system_use, &self.source)?;
        Ok(File {
            source: &self.source,
            record,
            susp_entries,
        })
    }

    /// Whether the image announces Rock Ridge. The announcement lives in
    /// the ER entry of the root directory's own `.` record.
    pub fn has_rock_ridge(&self) -> DiscusResult<bool> {
        let entries = self.root_dir()?.own_system_use()?;
        rock_ridge::has_rock_ridge(&entries)
    }
}

/// One node of the directory tree: either a directory (children enumerated
/// on demand) or a regular file (contents exposed as a byte stream). Nodes
/// borrow the image's source and never outlive it.
pub struct File<'a, R: ReadAt> {
    source: &'a R,
    record: DirectoryRecord,
    susp_entries: Vec<SystemUseEntry>,
}

impl<'a, R: ReadAt> File<'a, R> {
    pub fn is_dir(&self) -> bool {
        self.record.is_directory()
    }

    /// The user-visible name: the Rock Ridge alternate name when present,
    /// otherwise the ECMA-119 identifier, minus the `;N` version suffix for
    /// files.
    pub fn name(&self) -> String {
        if let Some(name) = rock_ridge::alternate_name(&self.susp_entries) {
            return name;
        }
        if self.is_dir() {
            self.record.identifier.clone()
        } else {
            self.record
                .identifier
                .split(';')
                .next()
                .unwrap_or_default()
                .to_string()
        }
    }

    /// Extent size in bytes.
    pub fn size(&self) -> u64 {
        self.record.extent_length as u64
    }

    pub fn modified(&self) -> DateTime<FixedOffset> {
        self.record.recorded_at.0
    }

    pub fn record(&self) -> &DirectoryRecord {
        &self.record
    }

    /// The SUSP entries attached to this node's directory record.
    pub fn system_use(&self) -> &[SystemUseEntry] {
        &self.susp_entries
    }

    /// Enumerate this directory's children in on-disc order. The `.` and
    /// `..` records head the extent but are not returned. Returns an empty
    /// list for regular files.
    pub fn children(&self) -> DiscusResult<Vec<File<'a, R>>> {
        let mut children = Vec::new();
        if !self.is_dir() {
            return Ok(children);
        }

        self.walk_records(|record, susp_entries| {
            if record.identifier != SELF_IDENTIFIER && record.identifier != PARENT_IDENTIFIER {
                children.push(File {
                    source: self.source,
                    record,
                    susp_entries,
                });
            }
            Ok(())
        })?;

        Ok(children)
    }

    /// The SUSP entries of this directory's own `.` record.
    fn own_system_use(&self) -> DiscusResult<Vec<SystemUseEntry>> {
        let mut own = Vec::new();
        let mut first = true;
        self.walk_records(|record, susp_entries| {
            if first && record.identifier == SELF_IDENTIFIER {
                own = susp_entries;
            }
            first = false;
            Ok(())
        })?;
        Ok(own)
    }

    /// Scan every directory record in this directory's extent. A zero
    /// length byte ends the current sector; the scan resumes at the next
    /// sector of the extent.
    fn walk_records(
        &self,
        mut visit: impl FnMut(DirectoryRecord, Vec<SystemUseEntry>) -> DiscusResult<()>,
    ) -> DiscusResult<()> {
        let extent_start = self.record.extent_location as u64 * SECTOR_SIZE as u64;
        let extent_length = self.record.extent_length as u64;
        let mut sector_buf = vec![0u8; SECTOR_SIZE as usize];

        let mut sector_offset = 0u64;
        while sector_offset < extent_length {
            let sector_len = (extent_length - sector_offset).min(SECTOR_SIZE as u64) as usize;
            let sector = &mut sector_buf[..sector_len];
            self.source
                .read_exact_at(sector, extent_start + sector_offset)?;

            let mut offset = 0usize;
            while offset < sector_len {
                match DirectoryRecord::decode(&sector[offset..])? {
                    None => break,
                    Some(record) => {
                        // advance by the on-disc length byte, which decode
                        // has already validated against the sector
                        offset += sector[offset] as usize;
                        let susp_entries =
                            split_system_use_entries(&record.system_use, self.source)?;
                        visit(record, susp_entries)?;
                    }
                }
            }

            sector_offset += SECTOR_SIZE as u64;
        }

        Ok(())
    }

    /// A lazy byte stream over this file's extent.
    pub fn reader(&self) -> ExtentReader<'a, R> {
        ExtentReader {
            source: self.source,
            position: self.record.extent_location as u64 * SECTOR_SIZE as u64,
            remaining: self.record.extent_length as u64,
        }
    }
}

/// `io::Read` over one contiguous extent of the backing source.
pub struct ExtentReader<'a, R: ReadAt> {
    source: &'a R,
    position: u64,
    remaining: u64,
}

impl<R: ReadAt> Read for ExtentReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let want = (buf.len() as u64).min(self.remaining) as usize;
        if want == 0 {
            return Ok(0);
        }
        let n = self.source.read_at(&mut buf[..want], self.position)?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "source ended inside a file extent",
            ));
        }
        self.position += n as u64;
        self.remaining -= n as u64;
        Ok(n)
    }
}
