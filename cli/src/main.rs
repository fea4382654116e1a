//! Relay CLI - package and roll out releases to a remote host

use clap::Parser;

use relay_cli::cli::Cli;
use relay_cli::error::DeployError;
use relay_cli::output::json;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json_output = cli.json;
    if let Err(e) = cli.run().await {
        let (code, error_code) = e
            .downcast_ref::<DeployError>()
            .map_or((1, "error"), |d| (d.exit_code(), d.code()));
        if json_output {
            match json::format_error(&format!("{e:#}"), error_code) {
                Ok(body) => eprintln!("{body}"),
                Err(_) => eprintln!("Error: {e:#}"),
            }
        } else {
            eprintln!("Error: {e:#}");
        }
        std::process::exit(code);
    }
}
