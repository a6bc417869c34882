use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum Cpu {
    Imx51,
    Imx53,
    Imx6q,
    Imx6dls,
    Imx7d,
    Imx8mq,
    Imx8mm,
}

impl Cpu {
    pub fn definitions_path(&self) -> PathBuf {
        let name = match self {
            Cpu::Imx51 => "imx51",
            Cpu::Imx53 => "imx53",
            Cpu::Imx6q => "imx6q",
            Cpu::Imx6dls => "imx6dls",
            Cpu::Imx7d => "imx7d",
            Cpu::Imx8mq => "imx8mq",
            Cpu::Imx8mm => "imx8mm",
        };
        PathBuf::from(format!("/etc/devregs_{name}.dat"))
    }
}

pub const DEFAULT_DEFINITIONS: &str = "/etc/devregs.dat";

/// Display and modify device registers at runtime
///
/// REGISTER is a name prefix (case-insensitive) or 0xADDRESS, optionally followed by
/// `.FIELD`/`:FIELD`, a bit range `:start[-end]`, or for addresses a width `.b`/`.w`/`.l`.
/// With VALUE (hex) the single matching register or field is written.
#[derive(Parser, Debug)]
pub struct Args {
    /// CPU whose definition file (/etc/devregs_<cpu>.dat) is used
    #[arg(short = 'c', long, value_enum, env = "DEVREGS_CPU")]
    pub cpu: Option<Cpu>,

    /// Definition file, takes precedence over `--cpu`
    #[arg(short = 'd', long, env = "DEVREGS_DEFINITIONS")]
    pub definitions: Option<PathBuf>,

    /// Memory device giving access to physical addresses
    #[arg(long, default_value = devregs_core::accessor::DEV_MEM)]
    pub mem: PathBuf,

    /// Register to show or modify, all registers if omitted
    pub register: Option<String>,

    /// Value to write
    #[arg(requires = "register")]
    pub value: Option<String>,
}

impl Args {
    pub fn definitions_path(&self) -> PathBuf {
        match (&self.definitions, self.cpu) {
            (Some(path), _) => path.clone(),
            (None, Some(cpu)) => cpu.definitions_path(),
            (None, None) => PathBuf::from(DEFAULT_DEFINITIONS),
        }
    }
}
