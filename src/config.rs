use crate::backend::ReplayOptions;
use crate::view::DisplayMode;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::level_filters::LevelFilter;

#[derive(Parser, Debug, Clone)]
#[command(name = "livecrab")]
#[command(version)]
#[command(
    about = "Live packet stream viewer with grouped drill-down and capture filters.",
    long_about = None,
    after_help = "Examples:\n  livecrab capture.pcapng\n  livecrab capture.pcap --filter 'tcp port 443' --grouped\n  livecrab capture.pcapng --tui --interval-ms 20"
)]
pub struct Cli {
    /// pcap or pcapng file replayed as the live source
    pub capture: PathBuf,

    /// Capture filter applied before the capture starts (e.g. "src host 10.0.0.1")
    #[arg(short, long, default_value = "")]
    pub filter: String,

    /// Start in grouped (source, destination) mode
    #[arg(short, long)]
    pub grouped: bool,

    /// Delay between replayed packets, 0 disables pacing
    #[arg(long, default_value_t = 5)]
    pub interval_ms: u64,

    /// Run the interactive terminal UI
    #[arg(long)]
    pub tui: bool,

    #[arg(long, default_value = "livecrab.log")]
    pub log_file: PathBuf,

    /// Log to stdout instead of the log file (ignored with --tui)
    #[arg(long)]
    pub log_stdout: bool,

    #[arg(long, default_value_t = LevelFilter::INFO)]
    pub log_level: LevelFilter,

    /// Number of visible rows printed in headless mode
    #[arg(short, long)]
    pub limit: Option<usize>,
}

impl Cli {
    pub fn replay_options(&self) -> ReplayOptions {
        ReplayOptions::new(&self.capture).with_interval(Duration::from_millis(self.interval_ms))
    }

    pub fn mode(&self) -> DisplayMode {
        if self.grouped {
            DisplayMode::Grouped
        } else {
            DisplayMode::Flat
        }
    }

    /// The terminal belongs to the TUI, so it never logs to stdout.
    pub fn logs_to_stdout(&self) -> bool {
        self.log_stdout && !self.tui
    }
}
