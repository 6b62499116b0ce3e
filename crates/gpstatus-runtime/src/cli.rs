//! CLI definition using clap derive.

use clap::{Parser, Subcommand};

pub const DEFAULT_SERVER: &str = "http://localhost:8000";

#[derive(Parser)]
#[command(name = "gpstatus", about = "Guided project status: live evaluation results")]
pub struct Cli {
    /// Evaluation service base URL
    #[arg(long, global = true, env = "GPSTATUS_SERVER", default_value = DEFAULT_SERVER)]
    pub server: String,

    /// Seconds allowed for the TCP/TLS connect
    #[arg(long, global = true, env = "GPSTATUS_CONNECT_TIMEOUT", default_value = "10")]
    pub connect_timeout: u64,

    /// Give up when the stream is silent this many seconds (default: wait forever)
    #[arg(long, global = true, env = "GPSTATUS_IDLE_TIMEOUT")]
    pub idle_timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Evaluate one roll number and exit
    Eval(EvalOpts),
    /// Prompt for roll numbers; a new entry replaces the running evaluation
    Interactive(InteractiveOpts),
}

#[derive(clap::Args)]
pub struct EvalOpts {
    /// Student roll number
    pub roll_number: String,

    /// Print the final state as JSON instead of a table
    #[arg(long)]
    pub json: bool,

    /// Color output: auto, always, never
    #[arg(long, default_value = "auto")]
    pub color: String,

    /// Only print the final table (no live redraw)
    #[arg(long)]
    pub no_live: bool,
}

#[derive(clap::Args, Default)]
pub struct InteractiveOpts {
    /// Color output: auto, always, never
    #[arg(long, default_value = "auto")]
    pub color: String,
}
