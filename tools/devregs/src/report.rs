use std::fmt::Display;

use devregs_core::{ResolvedTarget, WriteOutcome};

/// Something the tool has to tell about a register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report<'c> {
    Value {
        target: ResolvedTarget<'c>,
        raw: u32,
    },
    Written {
        target: ResolvedTarget<'c>,
        outcome: WriteOutcome,
    },
}

/// `0x` plus two hex digits per byte of the access
fn value_width(target: &ResolvedTarget<'_>) -> usize {
    target.width.bytes() * 2 + 2
}

impl<'c> Display for Report<'c> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Report::Value { target, raw } => {
                writeln!(
                    f,
                    "{}:{:#010x}\t={:#0w$x}",
                    target.name(),
                    target.address,
                    raw,
                    w = value_width(target)
                )?;
                for field in target.fields.iter() {
                    writeln!(
                        f,
                        "\t{:<16}\t{:>2}-{:>2}\t={:#x}",
                        field.name,
                        field.startbit,
                        field.end_bit(),
                        field.extract(*raw)
                    )?;
                }
                Ok(())
            }
            // the new value is always printed as a full word
            Report::Written { target, outcome } => writeln!(
                f,
                "{}:{:#010x} == {:#0w$x}...{:#010x}",
                target.name(),
                target.address,
                outcome.prior,
                outcome.new,
                w = value_width(target)
            ),
        }
    }
}
