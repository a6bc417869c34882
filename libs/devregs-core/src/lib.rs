//! Register catalogs, specifier resolution and physical register access for `devregs`.

pub mod accessor;
pub mod bits;
pub mod catalog;
pub mod error;
pub mod loader;
pub mod resolver;

pub use accessor::{Accessor, DevMem, PhysicalMemory, WriteOutcome};
pub use bits::parse_bits;
pub use catalog::{Catalog, FieldDescriptor, RegisterDescriptor, RegisterEntry, Width};
pub use error::{AccessError, BitsError, Error, LoadError, ParseError, ParseErrorKind, ResolveError};
pub use loader::{load_path, load_reader, parse_str, Definitions};
pub use resolver::{parse_value, resolve, write_target, ResolvedTarget};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::mock::MockMemory;

    const LED: &str = "LED_CTRL 0x02000000
:ENABLE:0-0
:MODE:1-2
";

    #[test]
    fn write_single_field_end_to_end() {
        let defs = parse_str(LED);
        assert!(defs.errors.is_empty());
        let targets = resolve(&defs.catalog, "LED_CTRL.ENABLE").unwrap();
        let target = write_target("LED_CTRL.ENABLE", &targets).unwrap();

        let mut accessor = Accessor::new(MockMemory::with(0x02000000, 0x6));
        let outcome = accessor.write(target, 1).unwrap();
        assert_eq!(outcome, WriteOutcome { prior: 0x6, new: 0x7 });
        assert_eq!(accessor.memory().cells[&0x02000000], 0x7);

        let enable = &target.fields[0];
        assert_eq!(enable.extract(outcome.new), 1);
    }

    #[test]
    fn ambiguous_write_never_reaches_memory() {
        let defs = parse_str(LED);
        let mut accessor = Accessor::new(MockMemory::with(0x02000000, 0x6));

        // both fields of LED_CTRL
        let targets = resolve(&defs.catalog, "led").unwrap();
        let refused = write_target("led", &targets)
            .map_err(Error::from)
            .and_then(|target| Ok(accessor.write(target, 1)?));
        assert!(matches!(
            refused,
            Err(Error::Resolve(ResolveError::AmbiguousFields { count: 2, .. }))
        ));
        assert!(!refused.unwrap_err().is_fatal());
        assert_eq!(accessor.memory().stores, 0);
        assert_eq!(accessor.memory().cells[&0x02000000], 0x6);
    }

    #[test]
    fn unknown_address_reads_whole_word() {
        let defs = parse_str(LED);
        let targets = resolve(&defs.catalog, "0x03000000").unwrap();
        let mut accessor = Accessor::new(MockMemory::with(0x03000000, 0xCAFEF00D));
        assert_eq!(accessor.read(&targets[0]).unwrap(), 0xCAFEF00D);
        let outcome = accessor.write(&targets[0], 0x12345678).unwrap();
        assert_eq!(outcome.new, 0x12345678);
    }
}
