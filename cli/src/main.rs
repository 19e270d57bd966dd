//! Outpost CLI - provision network appliances over SSH

use clap::Parser;
use outpost_cli::cli::Cli;
use outpost_cli::commands::provision::SessionFailed;
use outpost_cli::output::json::format_error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let json = cli.json;
    if let Err(e) = cli.run().await {
        let code = e
            .downcast_ref::<SessionFailed>()
            .map_or("error", |f| f.kind.as_str());
        match format_error(&format!("{e:#}"), code) {
            Ok(obj) if json => println!("{obj}"),
            _ => eprintln!("Error: {e:#}"),
        }
        std::process::exit(1);
    }
}

/// Diagnostics go to stderr so stdout stays clean for `--json`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "outpost_cli=info" } else { "warn" };
    let filter =
        EnvFilter::try_from_env("OUTPOST_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
