use std::process::ExitCode;

use clap::Parser;

fn main() -> ExitCode {
    extract_loader_cli::init_logging();
    let cli = extract_loader_cli::Cli::parse();
    match extract_loader_cli::run_cli(cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "startup failed");
            eprintln!("extract-loader: {err:#}");
            ExitCode::from(2)
        }
    }
}
