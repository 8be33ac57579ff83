use anyhow::Result;
use clap::Parser;

mod cli;
mod logging;
mod panic;
mod supervisor;
mod workload;

fn main() -> Result<()> {
    logging::init()?;
    let cli = cli::Cli::parse();

    let outcome = supervisor::run(cli)?;
    if outcome.failed() {
        std::process::exit(1);
    }
    Ok(())
}
