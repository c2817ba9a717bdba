use std::process::ExitCode;

use clap::Parser;

use paintcore::{cli, logger};

fn main() -> ExitCode {
    let args = cli::CliArgs::parse();

    // Session log (overwrites previous session log)
    logger::init(args.verbose);
    if let Some(path) = logger::log_path() {
        log::debug!("log file: {}", path.display());
    }

    let code = cli::run(args);
    if code != ExitCode::SUCCESS {
        log::error!("paintcore: one or more files failed");
    }
    log::logger().flush();
    code
}
