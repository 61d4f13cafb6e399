use std::fs::File;
use std::io::{self, Seek, SeekFrom};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use discus_iso::{extract_image_to_directory, ImageWriter};

#[derive(Parser)]
#[command(name = "discus")]
#[command(about = "Read and write ISO 9660 disc images", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract an image's file tree into a directory
    Extract {
        /// Path to the ISO image
        image: PathBuf,
        /// Directory to extract into
        target_dir: PathBuf,
    },
    /// Wrap standard input into a single-file image on standard output
    Create {
        /// Volume identifier of the new image
        volume_id: String,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Extract { image, target_dir } => {
            let file = File::open(&image)
                .with_context(|| format!("failed to open {}", image.display()))?;
            extract_image_to_directory(&file, &target_dir)
                .context("failed to extract image")?;
        }
        Commands::Create { volume_id } => {
            let writer = ImageWriter::new().context("failed to initialize image writer")?;
            writer
                .add_file(io::stdin().lock(), "file")
                .context("failed to stage standard input")?;

            // stdout is forward-only and the writer needs positional
            // writes, so assemble into a seekable temporary first
            let mut image =
                tempfile::tempfile().context("failed to create temporary image file")?;
            writer
                .write_to(&image, &volume_id)
                .context("failed to write image")?;

            image.seek(SeekFrom::Start(0))?;
            io::copy(&mut image, &mut io::stdout().lock())
                .context("failed to copy image to standard output")?;
        }
    }

    Ok(())
}
