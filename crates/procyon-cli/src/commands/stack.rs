use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use procyon_core::align::global::AlignMode;
use procyon_core::align::local::ApMethod;
use procyon_core::io::image_io::save_image;
use procyon_core::io::source::open_source;
use procyon_core::pipeline::config::StackConfig;
use procyon_core::pipeline::{Activity, CancelToken, ProgressReporter, StackPipeline};
use procyon_core::quality::rank::RankMethod;
use procyon_core::store::BufferingConfig;

#[derive(Clone, ValueEnum)]
pub enum AlignModeArg {
    Surface,
    Planet,
}

#[derive(Clone, ValueEnum)]
pub enum ApMethodArg {
    LocalSearch,
    Fft,
}

#[derive(Args)]
pub struct StackArgs {
    /// Input SER file or image directory
    pub source: PathBuf,

    /// TOML configuration file; flags below override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Global registration model
    #[arg(long, value_enum)]
    pub mode: Option<AlignModeArg>,

    /// Sharpness scoring function
    #[arg(long, value_enum)]
    pub ranker: Option<RankMethodArg>,

    /// Local shift measurement technique
    #[arg(long, value_enum)]
    pub ap_method: Option<ApMethodArg>,

    /// Percentage of best frames averaged into the reference
    #[arg(long)]
    pub reference_percent: Option<f64>,

    /// Percentage of locally best frames stacked per alignment point
    #[arg(long)]
    pub stack_percent: Option<f64>,

    /// Absolute per-point stack size (overrides --stack-percent)
    #[arg(long)]
    pub stack_number: Option<usize>,

    /// Alignment point box half-width
    #[arg(long)]
    pub box_half_width: Option<usize>,

    /// Alignment point patch half-width
    #[arg(long)]
    pub patch_half_width: Option<usize>,

    /// Local shift search radius
    #[arg(long)]
    pub search_width: Option<usize>,

    /// Recompute derived frame views instead of keeping them in memory
    #[arg(long)]
    pub low_memory: bool,

    /// Output file path (16-bit PNG or TIFF)
    #[arg(short, long, default_value = "stacked.tiff")]
    pub output: PathBuf,
}

#[derive(Clone, ValueEnum)]
pub enum RankMethodArg {
    Contrast,
    Laplacian,
}

struct BarReporter {
    bar: ProgressBar,
}

impl ProgressReporter for BarReporter {
    fn report(&self, activity: Activity, percent: u8) {
        self.bar.set_message(activity_label(activity));
        self.bar.set_position(percent as u64);
    }
}

fn activity_label(activity: Activity) -> &'static str {
    match activity {
        Activity::Read => "Reading frames",
        Activity::Rank => "Ranking frames",
        Activity::Align => "Aligning frames",
        Activity::SetRoi => "Setting region of interest",
        Activity::BuildReference => "Building reference",
        Activity::PlaceAps => "Placing alignment points",
        Activity::ComputeFrameQualities => "Measuring local shifts",
        Activity::Stack => "Stacking",
        Activity::Emit => "Finishing",
    }
}

fn build_config(args: &StackArgs) -> Result<StackConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file '{}'", path.display()))?;
            toml::from_str(&text)
                .with_context(|| format!("parsing config file '{}'", path.display()))?
        }
        None => StackConfig::default(),
    };

    if let Some(mode) = &args.mode {
        config.align_mode = match mode {
            AlignModeArg::Surface => AlignMode::Surface,
            AlignModeArg::Planet => AlignMode::Planet,
        };
    }
    if let Some(ranker) = &args.ranker {
        config.ranker_method = match ranker {
            RankMethodArg::Contrast => RankMethod::Contrast,
            RankMethodArg::Laplacian => RankMethod::Laplacian,
        };
    }
    if let Some(method) = &args.ap_method {
        config.ap_method = match method {
            ApMethodArg::LocalSearch => ApMethod::LocalSearch,
            ApMethodArg::Fft => ApMethod::Fft,
        };
    }
    if let Some(percent) = args.reference_percent {
        config.reference_percent = percent;
    }
    if let Some(percent) = args.stack_percent {
        config.stack_percent = percent;
    }
    if args.stack_number.is_some() {
        config.stack_number = args.stack_number;
    }
    if let Some(half) = args.box_half_width {
        config.ap_box_half_width = half;
    }
    if let Some(half) = args.patch_half_width {
        config.ap_patch_half_width = half;
    }
    if let Some(width) = args.search_width {
        config.ap_search_width = width;
    }
    if args.low_memory {
        config.buffering = BufferingConfig::recompute_all();
    }

    Ok(config)
}

pub fn run(args: &StackArgs) -> Result<()> {
    let config = build_config(args)?;
    tracing::debug!(?config, "resolved stacking configuration");
    let source = open_source(&args.source)?;
    let total = source.info().frame_count;

    println!(
        "Stacking {} frames from {}",
        total,
        style(args.source.display()).bold()
    );

    let bar = ProgressBar::new(100);
    bar.set_style(ProgressStyle::default_bar().template("{msg:<28} [{bar:40}] {pos}%")?);
    let reporter = Arc::new(BarReporter { bar: bar.clone() });

    let cancel = CancelToken::new();
    let start = Instant::now();

    let mut pipeline = StackPipeline::new(config, reporter, cancel)?;
    let result = pipeline.run(source.as_ref());

    let excluded = pipeline.excluded_frames().to_vec();
    let stacked = result?;
    bar.finish_and_clear();

    save_image(&stacked.data, &args.output)?;

    println!(
        "{} {}x{} image written to {} in {:.1?}",
        style("Done:").green().bold(),
        stacked.width(),
        stacked.height(),
        style(args.output.display()).bold(),
        start.elapsed()
    );
    if !excluded.is_empty() {
        println!(
            "{} {} frame(s) excluded: {:?}",
            style("Note:").yellow(),
            excluded.len(),
            excluded
        );
    }

    Ok(())
}
