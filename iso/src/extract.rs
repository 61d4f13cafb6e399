// Walks a parsed image onto a host directory tree.

use std::fs;
use std::io;
use std::path::Path;

use discus_core::{DiscusResult, ReadAt};
use log::debug;

use crate::reader::{File, Image};

/// Extract the whole directory tree of `source` under `destination`.
/// `destination` may already exist as a directory; an existing regular file
/// in the way of a directory is an error.
pub fn extract_image_to_directory<R: ReadAt>(source: R, destination: &Path) -> DiscusResult<()> {
    let image = Image::open(source)?;
    let root = image.root_dir()?;
    extract_node(&root, destination)
}

fn extract_node<R: ReadAt>(node: &File<'_, R>, target: &Path) -> DiscusResult<()> {
    if node.is_dir() {
        match fs::metadata(target) {
            Ok(metadata) if metadata.is_dir() => {}
            Ok(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} already exists and is a file", target.display()),
                )
                .into());
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => fs::create_dir(target)?,
            Err(e) => return Err(e.into()),
        }

        for child in node.children()? {
            extract_node(&child, &target.join(child.name()))?;
        }
    } else {
        debug!("extracting {}", target.display());
        let mut output = fs::File::create(target)?;
        io::copy(&mut node.reader(), &mut output)?;
    }

    Ok(())
}
