//! dma-crossbar CLI arguments.
//!
//! This module contains the definition of the CLI arguments for the
//! dma-crossbar application.

use clap::Parser;
use std::path::PathBuf;

/// dma-crossbar CLI arguments.
#[derive(Parser, Debug, Clone, Eq, PartialEq, Hash)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// JSON file describing the input and output streams
    pub streams: PathBuf,
    /// Pretty-print the JSON output
    #[clap(long)]
    pub pretty: bool,
    /// Include the DMA register writes in the output
    #[clap(long)]
    pub registers: bool,
}
