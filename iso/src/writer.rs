// Image writer. Inputs are staged into a private temporary directory tree
// whose names are already mangled; emission then runs in two passes over
// that tree: pass 1 walks it breadth-first and assigns every extent its
// sector run, pass 2 writes directory record areas and file payloads into
// the reserved runs. The volume descriptors are filled in last, which is
// why the sink must accept positional writes.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use chrono::Local;
use discus_core::{DiscusError, DiscusResult, WriteAt};
use log::{debug, info};
use tempfile::TempDir;

use crate::mangle::mangle_path;
use crate::record::{
    self, DirectoryRecord, FILE_FLAG_DIRECTORY, PARENT_IDENTIFIER, SELF_IDENTIFIER,
};
use crate::timestamp::{RecordingTimestamp, VolumeTimestamp};
use crate::types::{FIRST_FREE_SECTOR, PVD_SECTOR, SECTOR_SIZE, SYSTEM_AREA_SECTORS};
use crate::volume::{PrimaryVolumeDescriptor, VolumeDescriptor};

/// Combined size of the mandatory `.` and `..` records heading every
/// directory extent.
const DOT_RECORDS_LEN: u32 = 68;

/// Identifier placed in the primary volume descriptor's application field.
const APPLICATION_IDENTIFIER: &str = "DISCUS";

/// Stages input files and assembles an ISO 9660 image from them.
///
/// The staging directory is owned exclusively by the writer and removed on
/// [`cleanup`](Self::cleanup) or drop; cleanup after an error is safe and
/// calling it twice is a no-op.
pub struct ImageWriter {
    staging: Option<TempDir>,
}

impl ImageWriter {
    pub fn new() -> DiscusResult<Self> {
        let staging = TempDir::new()?;
        debug!("created staging directory {}", staging.path().display());
        Ok(Self {
            staging: Some(staging),
        })
    }

    fn staging_path(&self) -> DiscusResult<&Path> {
        match &self.staging {
            Some(dir) => Ok(dir.path()),
            None => Err(DiscusError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                "image writer has already been cleaned up",
            ))),
        }
    }

    /// Remove the staging directory. Idempotent.
    pub fn cleanup(&mut self) -> DiscusResult<()> {
        if let Some(dir) = self.staging.take() {
            dir.close()?;
        }
        Ok(())
    }

    /// Stage `data` under the given slash-separated logical path. Every
    /// path component is mangled to ISO 9660 identifier rules first.
    pub fn add_file(&self, mut data: impl Read, path: &str) -> DiscusResult<()> {
        let (directory, file_name) = mangle_path(path).ok_or_else(|| {
            DiscusError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("path {path:?} has no file component"),
            ))
        })?;

        let target_dir = self.staging_path()?.join(directory);
        fs::create_dir_all(&target_dir)?;

        let mut target = fs::File::create(target_dir.join(file_name))?;
        io::copy(&mut data, &mut target)?;
        Ok(())
    }

    /// Stage an existing host file under the given logical path.
    pub fn add_local_file(&self, source: &Path, path: &str) -> DiscusResult<()> {
        let file = fs::File::open(source)?;
        self.add_file(file, path)
    }

    /// Stage every file beneath `source` under the given logical root,
    /// keeping the relative structure. Empty directories do not survive
    /// staging, since only files are materialised.
    pub fn add_local_directory(&self, source: &Path, path: &str) -> DiscusResult<()> {
        for entry in fs::read_dir(source)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let logical = format!("{path}/{name}");
            if entry.file_type()?.is_dir() {
                self.add_local_directory(&entry.path(), &logical)?;
            } else {
                self.add_local_file(&entry.path(), &logical)?;
            }
        }
        Ok(())
    }

    /// Assemble the image and write it to `sink`.
    pub fn write_to<W: WriteAt>(&self, sink: &W, volume_identifier: &str) -> DiscusResult<()> {
        let staging = self.staging_path()?;
        let timestamp = RecordingTimestamp::now();

        // the system area is all zeros; never assume the sink starts zeroed
        let zero_sector = vec![0u8; SECTOR_SIZE as usize];
        for sector in 0..SYSTEM_AREA_SECTORS {
            sink.write_at(&zero_sector, sector as u64 * SECTOR_SIZE as u64)?;
        }

        let plan = LayoutPlan::allocate(staging)?;
        debug!(
            "layout: {} directories, {} sectors total",
            plan.directories.len(),
            plan.total_sectors
        );
        plan.emit(sink, staging, timestamp)?;

        let now = Local::now().fixed_offset();
        let volume_time = VolumeTimestamp::from_datetime(&now);
        let pvd = PrimaryVolumeDescriptor {
            system_identifier: std::env::consts::OS.to_string(),
            volume_identifier: volume_identifier.to_string(),
            volume_space_size: plan.total_sectors,
            volume_set_size: 1,
            volume_sequence_number: 1,
            logical_block_size: SECTOR_SIZE as u16,
            path_table_size: 0,
            type_l_path_table: 0,
            opt_type_l_path_table: 0,
            type_m_path_table: 0,
            opt_type_m_path_table: 0,
            root_record: plan.directory_record(0, SELF_IDENTIFIER, timestamp),
            volume_set_identifier: String::new(),
            publisher_identifier: String::new(),
            data_preparer_identifier: String::new(),
            application_identifier: APPLICATION_IDENTIFIER.to_string(),
            copyright_file_identifier: String::new(),
            abstract_file_identifier: String::new(),
            bibliographic_file_identifier: String::new(),
            created_at: volume_time,
            modified_at: volume_time,
            expires_at: VolumeTimestamp::zero(),
            effective_at: volume_time,
            file_structure_version: 1,
            application_used: vec![0; 512],
        };

        sink.write_at(
            &VolumeDescriptor::Primary(pvd).encode()?,
            PVD_SECTOR as u64 * SECTOR_SIZE as u64,
        )?;
        sink.write_at(
            &VolumeDescriptor::Terminator.encode()?,
            (PVD_SECTOR + 1) as u64 * SECTOR_SIZE as u64,
        )?;

        info!(
            "wrote ISO 9660 image {:?}: {} sectors",
            volume_identifier, plan.total_sectors
        );
        Ok(())
    }
}

fn staging_error(rel: &Path, source: io::Error) -> DiscusError {
    DiscusError::Staging {
        path: rel.to_path_buf(),
        source,
    }
}

/// One staged directory with its reserved extent and planned children.
struct DirPlan {
    /// Path relative to the staging root; empty for the root itself.
    rel_path: PathBuf,
    extent_location: u32,
    extent_sectors: u32,
    /// Index of the parent in the plan; the root is its own parent.
    parent: usize,
    children: Vec<ChildPlan>,
}

struct ChildPlan {
    identifier: String,
    is_dir: bool,
    extent_location: u32,
    extent_length: u32,
}

/// Pass 1 output: every extent placed, nothing written yet.
struct LayoutPlan {
    /// Breadth-first; index 0 is the root.
    directories: Vec<DirPlan>,
    total_sectors: u32,
}

impl LayoutPlan {
    /// Walk the staging tree breadth-first, reserving a sector run for each
    /// directory's record area and each file's contents. Parents land
    /// before children and siblings stay contiguous.
    fn allocate(staging: &Path) -> DiscusResult<Self> {
        let mut cursor = FIRST_FREE_SECTOR;
        let mut directories = Vec::new();

        let root_sectors = dir_record_area_sectors(staging, Path::new(""))?;
        directories.push(DirPlan {
            rel_path: PathBuf::new(),
            extent_location: cursor,
            extent_sectors: root_sectors,
            parent: 0,
            children: Vec::new(),
        });
        cursor += root_sectors;

        let mut next = 0;
        while next < directories.len() {
            let rel_path = directories[next].rel_path.clone();
            let mut children = Vec::new();

            for entry in sorted_entries(&staging.join(&rel_path), &rel_path)? {
                let child_rel = rel_path.join(&entry.name);
                if entry.is_dir {
                    let sectors = dir_record_area_sectors(&staging.join(&child_rel), &child_rel)?;
                    directories.push(DirPlan {
                        rel_path: child_rel,
                        extent_location: cursor,
                        extent_sectors: sectors,
                        parent: next,
                        children: Vec::new(),
                    });
                    children.push(ChildPlan {
                        identifier: entry.name,
                        is_dir: true,
                        extent_location: cursor,
                        extent_length: sectors * SECTOR_SIZE,
                    });
                    cursor += sectors;
                } else {
                    let length = checked_file_length(entry.len)?;
                    children.push(ChildPlan {
                        identifier: entry.name,
                        is_dir: false,
                        extent_location: cursor,
                        extent_length: length,
                    });
                    cursor += length_to_sectors(length);
                }
            }

            directories[next].children = children;
            next += 1;
        }

        Ok(Self {
            directories,
            total_sectors: cursor,
        })
    }

    /// The directory at `index`, expressed as a record under the given
    /// identifier (`\x00`, `\x01`, or its mangled name in the parent).
    fn directory_record(
        &self,
        index: usize,
        identifier: &str,
        timestamp: RecordingTimestamp,
    ) -> DirectoryRecord {
        let dir = &self.directories[index];
        DirectoryRecord {
            extended_attribute_len: 0,
            extent_location: dir.extent_location,
            extent_length: dir.extent_sectors * SECTOR_SIZE,
            recorded_at: timestamp,
            file_flags: FILE_FLAG_DIRECTORY,
            file_unit_size: 0,
            interleave_gap: 0,
            volume_sequence_number: 1,
            identifier: identifier.to_string(),
            system_use: Vec::new(),
        }
    }

    /// Pass 2: write every directory's record area and every file payload
    /// into the runs reserved by pass 1.
    fn emit<W: WriteAt>(
        &self,
        sink: &W,
        staging: &Path,
        timestamp: RecordingTimestamp,
    ) -> DiscusResult<()> {
        for (index, dir) in self.directories.iter().enumerate() {
            self.emit_record_area(sink, index, timestamp)?;

            for child in &dir.children {
                if child.is_dir {
                    continue;
                }
                let child_rel = dir.rel_path.join(&child.identifier);
                copy_file_extent(
                    sink,
                    &staging.join(&child_rel),
                    &child_rel,
                    child.extent_location,
                    child.extent_length,
                )?;
            }
        }
        Ok(())
    }

    fn emit_record_area<W: WriteAt>(
        &self,
        sink: &W,
        index: usize,
        timestamp: RecordingTimestamp,
    ) -> DiscusResult<()> {
        let dir = &self.directories[index];
        let mut area = RecordAreaWriter::new(sink, dir.extent_location);

        area.push(&self.directory_record(index, SELF_IDENTIFIER, timestamp))?;
        area.push(&self.directory_record(dir.parent, PARENT_IDENTIFIER, timestamp))?;

        for child in &dir.children {
            let record = DirectoryRecord {
                extended_attribute_len: 0,
                extent_location: child.extent_location,
                extent_length: child.extent_length,
                recorded_at: timestamp,
                file_flags: if child.is_dir { FILE_FLAG_DIRECTORY } else { 0 },
                file_unit_size: 0,
                interleave_gap: 0,
                volume_sequence_number: 1,
                identifier: child.identifier.clone(),
                system_use: Vec::new(),
            };
            area.push(&record)?;
        }

        area.finish()
    }
}

/// Packs directory records into a directory extent, never letting a record
/// straddle a sector boundary: when the next record would cross, the rest
/// of the current sector is zero-filled (the zero length byte doubles as
/// the "no further records in this sector" sentinel) and the record starts
/// at the next sector.
struct RecordAreaWriter<'a, W: WriteAt> {
    sink: &'a W,
    extent_start: u64,
    sector: u32,
    offset: u32,
}

impl<'a, W: WriteAt> RecordAreaWriter<'a, W> {
    fn new(sink: &'a W, extent_location: u32) -> Self {
        Self {
            sink,
            extent_start: extent_location as u64 * SECTOR_SIZE as u64,
            sector: 0,
            offset: 0,
        }
    }

    fn push(&mut self, record: &DirectoryRecord) -> DiscusResult<()> {
        let data = record.encode()?;
        if self.offset + data.len() as u32 > SECTOR_SIZE {
            self.pad_sector()?;
            self.sector += 1;
            self.offset = 0;
        }
        self.sink.write_at(
            &data,
            self.extent_start + self.sector as u64 * SECTOR_SIZE as u64 + self.offset as u64,
        )?;
        self.offset += data.len() as u32;
        Ok(())
    }

    /// Zero-fill the final partial sector. A record area that exactly fills
    /// its last sector needs no sentinel.
    fn finish(mut self) -> DiscusResult<()> {
        self.pad_sector()
    }

    fn pad_sector(&mut self) -> DiscusResult<()> {
        if self.offset < SECTOR_SIZE {
            let padding = vec![0u8; (SECTOR_SIZE - self.offset) as usize];
            self.sink.write_at(
                &padding,
                self.extent_start + self.sector as u64 * SECTOR_SIZE as u64 + self.offset as u64,
            )?;
        }
        Ok(())
    }
}

/// Directory listing entry, pre-sorted so the record order (and therefore
/// the image layout) is deterministic.
struct StagedEntry {
    name: String,
    is_dir: bool,
    len: u64,
}

fn sorted_entries(abs: &Path, rel: &Path) -> DiscusResult<Vec<StagedEntry>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(abs).map_err(|e| staging_error(rel, e))? {
        let entry = entry.map_err(|e| staging_error(rel, e))?;
        let metadata = entry.metadata().map_err(|e| staging_error(rel, e))?;
        entries.push(StagedEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir: metadata.is_dir(),
            len: metadata.len(),
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// Sector count of a directory's child-record area. This mirrors the pass-2
/// packing exactly; a plain division over the summed record sizes would
/// undercount whenever padding pushes a record into the next sector.
fn dir_record_area_sectors(abs: &Path, rel: &Path) -> DiscusResult<u32> {
    let mut sectors = 0u32;
    let mut occupied = DOT_RECORDS_LEN;

    for entry in sorted_entries(abs, rel)? {
        let record_len = record::encoded_len_for(entry.name.len()) as u32;
        if occupied + record_len > SECTOR_SIZE {
            sectors += 1;
            occupied = record_len;
        } else {
            occupied += record_len;
        }
    }

    if occupied > 0 {
        sectors += 1;
    }
    Ok(sectors)
}

/// Extent byte length of a staged file, or `FileTooLarge` past the 32-bit
/// addressing limit.
fn checked_file_length(len: u64) -> DiscusResult<u32> {
    u32::try_from(len).map_err(|_| DiscusError::FileTooLarge(len))
}

fn length_to_sectors(len: u32) -> u32 {
    len.div_ceil(SECTOR_SIZE)
}

/// Copy one staged file into its reserved extent, zero-padding the final
/// sector.
fn copy_file_extent<W: WriteAt>(
    sink: &W,
    abs: &Path,
    rel: &Path,
    extent_location: u32,
    extent_length: u32,
) -> DiscusResult<()> {
    let mut file = fs::File::open(abs).map_err(|e| staging_error(rel, e))?;
    let mut buffer = vec![0u8; SECTOR_SIZE as usize];
    let mut remaining = extent_length as u64;
    let mut offset = extent_location as u64 * SECTOR_SIZE as u64;

    while remaining > 0 {
        let wanted = remaining.min(SECTOR_SIZE as u64) as usize;
        file.read_exact(&mut buffer[..wanted])
            .map_err(|e| staging_error(rel, e))?;
        buffer[wanted..].fill(0);
        sink.write_at(&buffer, offset)?;
        offset += SECTOR_SIZE as u64;
        remaining -= wanted as u64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_mangles_every_path_component() {
        let writer = ImageWriter::new().unwrap();
        let contents = "hrh2309hr320h";
        writer
            .add_file(
                contents.as_bytes(),
                "FarTooLongFilePathThatWillBeTrimmed/dirø1/somefile.dat",
            )
            .unwrap();

        let staged = writer
            .staging_path()
            .unwrap()
            .join("FARTOOLONGFILEPATHTHATWILLBETRI")
            .join("DIR__1")
            .join("SOMEFILE.DAT;1");
        assert_eq!(fs::read(staged).unwrap(), contents.as_bytes());
    }

    #[test]
    fn add_file_rejects_empty_path() {
        let writer = ImageWriter::new().unwrap();
        assert!(writer.add_file(&b"x"[..], "///").is_err());
    }

    #[test]
    fn cleanup_is_idempotent() {
        let mut writer = ImageWriter::new().unwrap();
        let staging = writer.staging_path().unwrap().to_path_buf();
        writer.cleanup().unwrap();
        assert!(!staging.exists());
        writer.cleanup().unwrap();

        // staging operations after cleanup fail instead of recreating state
        assert!(writer.add_file(&b"x"[..], "file").is_err());
    }

    #[test]
    fn add_local_directory_propagates_source_errors() {
        let writer = ImageWriter::new().unwrap();

        let missing = writer
            .add_local_directory(Path::new("/nonexistent/discus-test"), "foo")
            .unwrap_err();
        match missing {
            DiscusError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
            other => panic!("expected an IO error, got {other}"),
        }

        // a file is not a valid source directory
        let staging = TempDir::new().unwrap();
        fs::write(staging.path().join("plain"), b"x").unwrap();
        assert!(writer
            .add_local_directory(&staging.path().join("plain"), "foo")
            .is_err());
    }

    #[test]
    fn file_length_limit() {
        assert_eq!(checked_file_length(0).unwrap(), 0);
        assert_eq!(checked_file_length(u32::MAX as u64).unwrap(), u32::MAX);
        assert!(matches!(
            checked_file_length(1 << 32),
            Err(DiscusError::FileTooLarge(_))
        ));
    }

    #[test]
    fn sector_rounding() {
        assert_eq!(length_to_sectors(0), 0);
        assert_eq!(length_to_sectors(1), 1);
        assert_eq!(length_to_sectors(2048), 1);
        assert_eq!(length_to_sectors(2049), 2);
    }

    #[test]
    fn record_area_sectors_mirror_packing() {
        let staging = TempDir::new().unwrap();

        // empty directory still needs one sector for . and ..
        assert_eq!(
            dir_record_area_sectors(staging.path(), Path::new("")).unwrap(),
            1
        );

        // 8-byte identifiers pack as 42-byte records: 68 + 47*42 = 2042
        // fills within one sector, the 48th record starts the next
        for i in 0..47 {
            fs::write(staging.path().join(format!("FILE{i:04}")), b"x").unwrap();
        }
        assert_eq!(
            dir_record_area_sectors(staging.path(), Path::new("")).unwrap(),
            1
        );

        fs::write(staging.path().join("FILE9999"), b"x").unwrap();
        assert_eq!(
            dir_record_area_sectors(staging.path(), Path::new("")).unwrap(),
            2
        );
    }

    #[test]
    fn allocation_is_breadth_first() {
        let staging = TempDir::new().unwrap();
        fs::create_dir(staging.path().join("DIR1")).unwrap();
        fs::create_dir(staging.path().join("DIR2")).unwrap();
        fs::write(staging.path().join("DIR1").join("A.TXT;1"), b"hello").unwrap();
        fs::write(staging.path().join("DIR2").join("B.TXT;1"), b"world").unwrap();

        let plan = LayoutPlan::allocate(staging.path()).unwrap();
        assert_eq!(plan.directories.len(), 3);

        // root first, then both siblings, then their files
        assert_eq!(plan.directories[0].extent_location, FIRST_FREE_SECTOR);
        assert_eq!(plan.directories[1].extent_location, FIRST_FREE_SECTOR + 1);
        assert_eq!(plan.directories[2].extent_location, FIRST_FREE_SECTOR + 2);
        assert_eq!(plan.directories[1].parent, 0);
        assert_eq!(plan.directories[2].parent, 0);
        assert_eq!(plan.total_sectors, FIRST_FREE_SECTOR + 5);
    }

    #[test]
    fn zero_length_file_reserves_no_sectors() {
        let staging = TempDir::new().unwrap();
        fs::write(staging.path().join("EMPTY.BIN;1"), b"").unwrap();
        fs::write(staging.path().join("FULL.BIN;1"), b"data").unwrap();

        let plan = LayoutPlan::allocate(staging.path()).unwrap();
        let root = &plan.directories[0];
        assert_eq!(root.children[0].identifier, "EMPTY.BIN;1");
        assert_eq!(root.children[0].extent_length, 0);
        // the empty file's location collapses onto the next extent
        assert_eq!(
            root.children[0].extent_location,
            root.children[1].extent_location
        );
        assert_eq!(plan.total_sectors, FIRST_FREE_SECTOR + 2);
    }
}
