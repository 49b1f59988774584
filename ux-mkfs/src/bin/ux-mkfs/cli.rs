use clap::Parser;
use std::path::PathBuf;

/// Format a device or image file as uxfs
#[derive(Parser)]
#[command(version)]
pub struct Cli {
    /// Device or image file to format
    pub device: PathBuf,

    /// Create the image file if missing and grow it to the full uxfs size
    #[arg(long, short)]
    pub create: bool,
}
