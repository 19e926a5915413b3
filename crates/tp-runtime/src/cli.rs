//! Command-line arguments.

use clap::{ArgAction, Parser};
use std::time::Duration;
use tp_processor::ProcessorConfig;
use tp_types::HeaderStyle;

/// Transaction processor runtime
#[derive(Parser, Debug)]
#[command(name = "tp-runtime")]
#[command(about = "Connects to a validator and executes transactions for the bundled families")]
pub struct Args {
    /// Validator endpoint (tcp://host:port). Overrides TP_CONNECT
    #[arg(short = 'C', long)]
    pub connect: Option<String>,

    /// Request header style: expanded or raw. Overrides TP_HEADER_STYLE
    #[arg(long)]
    pub header_style: Option<HeaderStyle>,

    /// Sub-request timeout in milliseconds. Overrides TP_REQUEST_TIMEOUT_MS
    #[arg(long)]
    pub request_timeout_ms: Option<u64>,

    /// Maximum concurrently executing transactions. Overrides TP_MAX_CONCURRENCY
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// Maximum frame size in bytes. Overrides TP_MAX_FRAME_SIZE
    #[arg(long)]
    pub max_frame_size: Option<usize>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Apply the flags that were given on top of `base`.
    pub fn apply(&self, base: ProcessorConfig) -> ProcessorConfig {
        let mut config = base;
        if let Some(endpoint) = &self.connect {
            config.endpoint = endpoint.clone();
        }
        if let Some(style) = self.header_style {
            config.header_style = style;
        }
        if let Some(ms) = self.request_timeout_ms {
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = self.max_concurrency {
            config.max_concurrent_requests = n;
        }
        if let Some(n) = self.max_frame_size {
            config.max_frame_size = n;
        }
        config
    }
}
