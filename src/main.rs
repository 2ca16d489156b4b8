use clap::Parser;
use dcabot::cli::{run, Cli};
use dcabot::obs::init_tracing;

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_tracing(&cli.log_level, &cli.log_format) {
        eprintln!("warning: {e}");
    }
    run(cli)
}
