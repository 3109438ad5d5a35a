//! Command-line configuration.
//!
//! There is no persisted state or configuration file; every run is
//! configured entirely from its arguments.

use clap::Parser;

use crate::constants::DEFAULT_PORT;

/// `dataserv`: a publish-subscribe data broker.
#[derive(Parser, Debug)]
#[command(name = "dataserv")]
#[command(version)]
#[command(about = "Fan out named data streams from one source to many sinks")]
pub struct Args {
    /// TCP port to listen on (loopback only).
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Raise log verbosity; repeat for more (`-v`, `-vv`, ...).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Translate `-v` occurrences into an `env_logger` filter string,
    /// used only when `RUST_LOG` is not already set.
    pub fn default_log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}
