use clap::Parser;
use clio::{Input, Output};

/// Generate a devregs definition file from a CMSIS-SVD device description
#[derive(Parser, Debug)]
pub struct Args {
    /// SVD file describing the device
    #[arg(short = 's', long, value_parser)]
    pub svd: Input,

    /// Definition file to write, stdout by default
    #[arg(short = 'o', long, value_parser, default_value = "-")]
    pub output: Output,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
