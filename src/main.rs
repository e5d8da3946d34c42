use clap::Parser;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = soundgrade::cli::Cli::parse();
    match soundgrade::run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(1)
        }
    }
}
