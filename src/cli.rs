use clap::Parser;
use std::path::PathBuf;

const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Engine: simulated (seek pacing + continuous)\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Drive the trick-play controller against a simulated playback engine
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Command script: comma separated `cmd@ms` items, e.g. `ff1@500,ff@2500,normal@5000`.
    /// Commands: ff1..ff3, fr1..fr3, normal, ff, rw, seek=<ms>, frame=<n>
    #[arg(value_name = "SCRIPT")]
    pub script: Option<String>,

    /// Simulated content duration in milliseconds
    #[arg(short = 'd', long = "duration", value_name = "MS", default_value_t = 600_000)]
    pub duration_ms: i64,

    /// Start position in milliseconds
    #[arg(short = 's', long = "start", value_name = "MS", default_value_t = 0)]
    pub start_ms: i64,

    /// Simulate a live (sliding window) source
    #[arg(long = "live")]
    pub live: bool,

    /// Whether the content carries an iframe-only video track
    #[arg(short = 'i', long = "iframe", value_name = "0|1", default_value = "1")]
    pub iframe: u8,

    /// Total run time in milliseconds (at least until the last script step)
    #[arg(short = 't', long = "run-time", value_name = "MS", default_value_t = 8000)]
    pub run_ms: u64,

    /// Enable debug logging to file (default: trickplay.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,
}
