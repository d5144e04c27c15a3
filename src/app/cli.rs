use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "marquee")]
#[command(version)]
#[command(about = "Drives a scrolling Betabrite LED sign from MQTT, Home Assistant and REST data", long_about = None)]
pub struct Args {
    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Path to the sign layout file
    #[arg(short, long, default_value = "data/layout.toml")]
    pub layout: PathBuf,

    /// Serial device the sign is connected to (overrides config),
    /// use "cli" to print sign writes instead
    #[arg(short, long)]
    pub device: Option<String>,

    /// Enable debug logging
    #[arg(short = 'D', long)]
    pub debug: bool,
}
