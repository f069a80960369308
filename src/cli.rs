use crate::types::{MapTheme, OutputConfig};
use clap::Parser;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_HASH"),
    ", built ",
    env!("BUILD_TIME"),
    ")"
);

#[derive(Parser, Debug, Clone)]
#[command(
    name = "reconmap",
    version,
    long_version = LONG_VERSION,
    about = "Passive external attack-surface mapper",
    long_about = "ReconMap discovers subdomains from public certificate transparency sources,\nresolves them, geolocates the live addresses and ranks each host by the kind of\ninfrastructure it runs on."
)]
pub struct Args {
    /// Target apex domain
    #[arg(short = 't', long = "target", value_name = "DOMAIN", required_unless_present = "list_sources")]
    pub target: Option<String>,

    /// HTML map output file [default: attack_surface.html]
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub map_file: Option<String>,

    /// Also export the results as CSV
    #[arg(long = "csv", value_name = "FILE")]
    pub csv_file: Option<String>,

    /// Also export the full report as JSON
    #[arg(long = "json", value_name = "FILE")]
    pub json_file: Option<String>,

    /// Map tile theme
    #[arg(long = "theme", value_enum)]
    pub theme: Option<MapTheme>,

    /// Skip HTML map generation
    #[arg(long = "no-map", conflicts_with = "map_file")]
    pub no_map: bool,

    /// Maximum concurrent DNS lookups
    #[arg(long = "threads", value_name = "N")]
    pub threads: Option<usize>,

    /// Per-lookup DNS timeout in seconds
    #[arg(long = "timeout", value_name = "SECS")]
    pub timeout: Option<f64>,

    /// Configuration file path
    #[arg(short = 'c', long = "config")]
    pub config_path: Option<String>,

    /// Verbose mode
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Silent mode (warnings and the report only)
    #[arg(long = "silent", conflicts_with = "verbose")]
    pub silent: bool,

    /// Disable progress bars
    #[arg(long = "no-progress")]
    pub no_progress: bool,

    /// List all available sources
    #[arg(long = "list-sources")]
    pub list_sources: bool,
}

impl Args {
    /// Progress bars only make sense on an interactive terminal.
    pub fn use_progress(&self) -> bool {
        !self.no_progress && !self.silent && atty::is(atty::Stream::Stderr)
    }

    /// Command-line output choices win over the config file.
    pub fn apply_output(&self, output: &mut OutputConfig) {
        if self.no_map {
            output.map_file = None;
        } else if self.map_file.is_some() {
            output.map_file = self.map_file.clone();
        }
        if let Some(theme) = self.theme {
            output.theme = theme;
        }
        if self.csv_file.is_some() {
            output.csv_file = self.csv_file.clone();
        }
        if self.json_file.is_some() {
            output.json_file = self.json_file.clone();
        }
        output.verbose = self.verbose;
    }

    pub fn log_level(&self) -> log::LevelFilter {
        if self.verbose {
            log::LevelFilter::Debug
        } else if self.silent {
            log::LevelFilter::Warn
        } else {
            log::LevelFilter::Info
        }
    }
}
