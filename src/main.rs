use clap::Parser;
use quotesync::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
