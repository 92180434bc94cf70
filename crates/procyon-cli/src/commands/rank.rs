use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use procyon_core::io::source::open_source;
use procyon_core::quality::rank::{rank_frames, RankMethod};
use procyon_core::store::{BufferingConfig, FrameStore};

#[derive(Clone, ValueEnum)]
pub enum RankMethodArg {
    Contrast,
    Laplacian,
}

#[derive(Args)]
pub struct RankArgs {
    /// Input SER file or image directory
    pub source: PathBuf,

    /// Sharpness scoring function
    #[arg(long, value_enum, default_value = "contrast")]
    pub method: RankMethodArg,

    /// Gaussian blur kernel width (odd)
    #[arg(long, default_value = "7")]
    pub gauss_width: usize,

    /// Subsampling stride for the contrast score
    #[arg(long, default_value = "2")]
    pub stride: usize,

    /// Show only the best N frames
    #[arg(long, default_value = "10")]
    pub top: usize,
}

pub fn run(args: &RankArgs) -> Result<()> {
    let source = open_source(&args.source)?;
    let total = source.info().frame_count;

    let bar = ProgressBar::new(total as u64);
    bar.set_style(ProgressStyle::default_bar().template("Scoring [{bar:40}] {pos}/{len}")?);

    let store = FrameStore::from_source(
        source.as_ref(),
        Default::default(),
        args.gauss_width,
        BufferingConfig::default(),
        |_| {},
    )?;

    let method = match args.method {
        RankMethodArg::Contrast => RankMethod::Contrast,
        RankMethodArg::Laplacian => RankMethod::Laplacian,
    };
    let ranking = rank_frames(&store, method, args.stride, |done| {
        bar.set_position(done as u64);
    })?;
    bar.finish_and_clear();

    println!(
        "{} (anchor: frame {})",
        style("Frame ranking").bold(),
        ranking.best
    );
    println!("{:>8}  {:>8}", "frame", "score");
    for &index in ranking.quality_sorted.iter().take(args.top) {
        println!("{index:>8}  {:>8.4}", ranking.scores[index]);
    }

    Ok(())
}
