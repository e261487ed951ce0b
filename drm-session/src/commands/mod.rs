mod inspect;
mod license;

pub use inspect::Inspect;
pub use license::License;

use anyhow::{Result, bail};
use base64::Engine;
use clap::{Parser, Subcommand};
use drm_cenc::pssh::PsshBox;
use std::{fs, path::Path};

/// Inspect protection init data and negotiate content licenses.
#[derive(Debug, Clone, Parser)]
#[command(version, author = "clitic <clitic21@gmail.com>", about)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Print debug output.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    Inspect(Inspect),
    License(License),
}

/// Every `pssh` box of an init segment file or of a base64 encoded box.
fn read_pssh(input: &str) -> Result<Vec<PsshBox>> {
    let boxes = if Path::new(input).exists() {
        PsshBox::from_init(&fs::read(input)?)?
    } else if let Ok(data) = base64::engine::general_purpose::STANDARD.decode(input.trim()) {
        vec![PsshBox::parse(&data)?]
    } else {
        bail!("Unable to determine the INPUT type.");
    };

    if boxes.is_empty() {
        bail!("No pssh box found in '{}'.", input);
    }

    Ok(boxes)
}
