use std::{error::Error as _, process::ExitCode};

use clap::Parser;
use cli::Args;
use devregs_core::{
    load_path, parse_value, resolve, write_target, Accessor, Catalog, DevMem, Error,
    PhysicalMemory, ResolveError, ResolvedTarget,
};
use report::Report;

mod cli;
mod report;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", chain(&e));
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), Error> {
    let path = args.definitions_path();
    let definitions = load_path(&path)?;
    if !definitions.errors.is_empty() {
        log::info!(
            "{}: {} lines skipped",
            path.display(),
            definitions.errors.len()
        );
    }
    let mut accessor = Accessor::new(DevMem::with_path(&args.mem));
    execute(
        &definitions.catalog,
        &mut accessor,
        args.register.as_deref(),
        args.value.as_deref(),
        |report| print!("{report}"),
    )
}

/// Shows every entry, the targets of `register`, or writes `value` to its single target.
fn execute<'c, M: PhysicalMemory>(
    catalog: &'c Catalog,
    accessor: &mut Accessor<M>,
    register: Option<&str>,
    value: Option<&str>,
    mut sink: impl FnMut(Report<'c>),
) -> Result<(), Error> {
    let Some(spec) = register else {
        let targets = catalog
            .entries()
            .iter()
            .map(|entry| ResolvedTarget::from_entry(catalog, entry))
            .collect();
        return show_each(accessor, targets, &mut sink);
    };

    let targets = resolve(catalog, spec)?;
    if targets.is_empty() {
        return Err(ResolveError::NothingMatched(spec.to_string()).into());
    }
    let Some(value) = value else {
        return show_each(accessor, targets, &mut sink);
    };

    let value = parse_value(value)?;
    let target = write_target(spec, &targets)?;
    let raw = accessor.read(target)?;
    sink(Report::Value {
        target: target.clone(),
        raw,
    });
    let outcome = accessor.write(target, value)?;
    sink(Report::Written {
        target: target.clone(),
        outcome,
    });
    Ok(())
}

/// Registers that cannot be read are reported and skipped, unless the memory device itself failed.
fn show_each<'c, M: PhysicalMemory>(
    accessor: &mut Accessor<M>,
    targets: Vec<ResolvedTarget<'c>>,
    sink: &mut impl FnMut(Report<'c>),
) -> Result<(), Error> {
    for target in targets {
        match accessor.read(&target) {
            Ok(raw) => sink(Report::Value { target, raw }),
            Err(e) if !e.is_fatal() => log::error!("{}: {e}", target.label()),
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn chain(error: &Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(inner) = source {
        message.push_str(&format!(": {inner}"));
        source = inner.source();
    }
    message
}
