mod cli;
mod commands;
mod output;
mod session;

use clap::Parser;
use orch_core::OrchError;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = cli::Cli::parse();
    if let Err(err) = cli.execute().await {
        let code = match err.downcast_ref::<OrchError>() {
            Some(orch_err) => {
                output::print_error(orch_err);
                output::exit_code_for(orch_err)
            }
            None => {
                eprintln!("{} {err:#}", "error:");
                1
            }
        };
        std::process::exit(code);
    }
}
