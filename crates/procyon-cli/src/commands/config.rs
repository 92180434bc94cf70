use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use procyon_core::pipeline::config::StackConfig;

#[derive(Args)]
pub struct ConfigArgs {
    /// Write the configuration to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn run(args: &ConfigArgs) -> Result<()> {
    let config = StackConfig::default();
    let text = toml::to_string_pretty(&config).context("serializing default configuration")?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, &text)
                .with_context(|| format!("writing '{}'", path.display()))?;
            println!("Default configuration written to {}", path.display());
        }
        None => print!("{text}"),
    }

    Ok(())
}
