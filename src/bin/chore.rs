use std::process::ExitCode;

use chore::cli::Cli;

fn main() -> ExitCode {
    Cli::new().main()
}
