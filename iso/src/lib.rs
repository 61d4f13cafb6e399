//! ISO 9660 (ECMA-119) images: parse an existing image into a lazy file
//! tree, or assemble a new one from staged file contents. SUSP system-use
//! areas are decoded on the read path, with Rock Ridge (RRIP_1991A) names
//! recognised where present.

pub mod endian;
pub mod extract;
pub mod mangle;
pub mod reader;
pub mod record;
pub mod rock_ridge;
pub mod susp;
pub mod timestamp;
pub mod types;
pub mod volume;
pub mod writer;

pub use discus_core::{DiscusError, DiscusResult, ReadAt, WriteAt};

pub use extract::extract_image_to_directory;
pub use reader::{ExtentReader, File, Image};
pub use record::DirectoryRecord;
pub use types::SECTOR_SIZE;
pub use volume::{PrimaryVolumeDescriptor, VolumeDescriptor, VolumeDescriptorType};
pub use writer::ImageWriter;
