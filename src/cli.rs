use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::core::player::MissPolicy;

/// What to show while a frame is still decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MissPolicyArg {
    /// Show the poster frame
    Poster,
    /// Keep the last presented frame
    Hold,
}

impl From<MissPolicyArg> for MissPolicy {
    fn from(arg: MissPolicyArg) -> Self {
        match arg {
            MissPolicyArg::Poster => MissPolicy::ShowPoster,
            MissPolicyArg::Hold => MissPolicy::HoldPrevious,
        }
    }
}

/// Headless animated GIF player with a bounded frame cache
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Animated GIF (or PNG/JPEG still) to play
    #[arg(value_name = "FILE")]
    pub file_path: PathBuf,

    /// Settings file (default: gifreel.json in the config directory)
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Frame cache size (clamped to 2..=frame count)
    #[arg(long = "cache-size", value_name = "N")]
    pub cache_size: Option<usize>,

    /// Keep straight alpha instead of premultiplying decoded frames
    #[arg(long = "no-predraw")]
    pub no_predraw: bool,

    /// Display clock rate
    #[arg(long = "fps", value_name = "HZ")]
    pub fps: Option<f64>,

    /// Stop after this many seconds even if the animation loops forever
    #[arg(short = 'd', long = "duration", value_name = "SECS", default_value_t = 10.0)]
    pub duration: f64,

    /// What to show while a frame is still decoding
    #[arg(long = "miss-policy", value_enum, value_name = "POLICY")]
    pub miss_policy: Option<MissPolicyArg>,

    /// Clock run context name
    #[arg(long = "run-context", value_name = "NAME")]
    pub run_context: Option<String>,

    /// Enable debug logging to file (default: gifreel.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,
}
