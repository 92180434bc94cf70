use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use console::style;

use procyon_core::io::source::open_source;

#[derive(Args)]
pub struct InfoArgs {
    /// Input SER file or image directory
    pub source: PathBuf,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let source = open_source(&args.source)?;
    let info = source.info();

    println!("{}", style(info.path.display()).bold());
    println!("  Frames:     {}", info.frame_count);
    println!("  Dimensions: {}x{}", info.width, info.height);
    println!("  Channels:   {}", info.channels);
    println!("  Depth:      {} bit", info.depth);
    println!("  Color mode: {:?}", info.color_mode);
    if let Some(observer) = &info.observer {
        println!("  Observer:   {observer}");
    }
    if let Some(instrument) = &info.instrument {
        println!("  Instrument: {instrument}");
    }
    if let Some(telescope) = &info.telescope {
        println!("  Telescope:  {telescope}");
    }

    Ok(())
}
