//! gpstatus: live guided-project evaluation status from the terminal.
//! Streams per-project results for a roll number and projects the final grade.

use clap::Parser;

mod cli;
mod cmd_eval;
mod cmd_interactive;
mod config;
mod driver;
mod feed;
mod render;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // Logs go to stderr so they never interleave with the table or JSON.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(config::log_filter()))
        .with_writer(std::io::stderr)
        .init();

    let settings = config::Settings::from_cli(&args)?;
    let feed = feed::HttpFeed::new(&settings)?;
    tracing::debug!(server = %feed.base(), "evaluation service configured");

    let command = args
        .command
        .unwrap_or_else(|| cli::Command::Interactive(cli::InteractiveOpts::default()));

    match command {
        cli::Command::Eval(opts) => {
            let exit_code = cmd_eval::cmd_eval(&feed, &settings, &opts).await?;
            if exit_code != 0 {
                std::process::exit(exit_code);
            }
        }
        cli::Command::Interactive(opts) => {
            cmd_interactive::cmd_interactive(&feed, &settings, &opts).await?;
        }
    }

    Ok(())
}
