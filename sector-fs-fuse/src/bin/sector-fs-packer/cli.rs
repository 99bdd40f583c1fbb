use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
pub struct Cli {
    /// Source directory, every regular file in it is packed
    #[arg(long, short)]
    pub source: PathBuf,

    /// Output image
    #[arg(long, short)]
    pub out: PathBuf,

    /// Image size in sectors
    #[arg(long, default_value_t = 16 * 2048)]
    pub sectors: u32,

    /// Directory inside the image receiving the files, created with its parents
    #[arg(long, short, default_value = "/")]
    pub target_dir: String,
}
