use std::{io::Read, process::ExitCode};

use clap::Parser;
use cli::Args;

mod cli;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let mut args = Args::parse();

    let mut svd_as_string = String::new();
    if let Err(e) = args.svd.read_to_string(&mut svd_as_string) {
        log::error!("cannot read SVD input: {e}");
        return ExitCode::FAILURE;
    }
    let device = match svd_parser::parse(&svd_as_string) {
        Ok(device) => device,
        Err(e) => {
            log::error!("invalid SVD: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    log::info!(
        "{}: {} peripherals",
        device.name,
        device.peripherals.len()
    );

    if let Err(e) = devregs_from_svd::write_definitions(device, &mut args.output) {
        log::error!("cannot write definitions: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
