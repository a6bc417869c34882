//! Sized loads and field-aware stores to physical addresses.

use std::{
    fs::{File, OpenOptions},
    os::unix::fs::OpenOptionsExt,
    path::PathBuf,
    ptr,
};

use memmap2::{MmapMut, MmapOptions};

use crate::{catalog::Width, error::AccessError, resolver::ResolvedTarget};

pub const PAGE_SIZE: u64 = 4096;
pub const DEV_MEM: &str = "/dev/mem";

/// Where register values actually live.
pub trait PhysicalMemory {
    fn load(&mut self, address: u64, width: Width) -> Result<u32, AccessError>;
    /// `value` is already truncated to `width`
    fn store(&mut self, address: u64, width: Width, value: u32) -> Result<(), AccessError>;
}

/// Physical memory through a memory device such as `/dev/mem`.
///
/// The device is opened on first access. At most one page is mapped at a time,
/// touching another page unmaps the current one first.
pub struct DevMem {
    path: PathBuf,
    file: Option<File>,
    window: Option<Window>,
}

struct Window {
    page: u64,
    map: MmapMut,
}

impl DevMem {
    pub fn new() -> Self {
        Self::with_path(DEV_MEM)
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
            window: None,
        }
    }

    fn open(&mut self) -> Result<&File, AccessError> {
        let file = match self.file.take() {
            Some(file) => file,
            None => OpenOptions::new()
                .read(true)
                .write(true)
                .custom_flags(libc::O_SYNC)
                .open(&self.path)
                .map_err(|source| AccessError::Open {
                    path: self.path.clone(),
                    source,
                })?,
        };
        Ok(&*self.file.insert(file))
    }

    fn map_page(&mut self, page: u64) -> Result<MmapMut, AccessError> {
        let file = self.open()?;
        // SAFETY: the mapping is only reached through volatile accesses in this
        // module and never handed out as a Rust reference.
        unsafe {
            MmapOptions::new()
                .offset(page)
                .len(PAGE_SIZE as usize)
                .map_mut(file)
        }
        .map_err(|source| AccessError::Map { page, source })
    }

    /// Pointer to `address` inside the current window, remapping if needed.
    fn acquire(&mut self, address: u64) -> Result<*mut u8, AccessError> {
        let page = address & !(PAGE_SIZE - 1);
        let offset = (address - page) as usize;
        let window = match self.window.take() {
            Some(window) if window.page == page => window,
            previous => {
                if let Some(previous) = previous {
                    log::debug!("unmapping page {:#010x}", previous.page);
                }
                log::debug!("mapping page {page:#010x}");
                Window {
                    page,
                    map: self.map_page(page)?,
                }
            }
        };
        let window = self.window.insert(window);
        // SAFETY: offset < PAGE_SIZE, the length of the mapping
        Ok(unsafe { window.map.as_mut_ptr().add(offset) })
    }
}

impl Default for DevMem {
    fn default() -> Self {
        Self::new()
    }
}

fn check_alignment(address: u64, width: Width) -> Result<(), AccessError> {
    if address % width.bytes() as u64 != 0 {
        return Err(AccessError::Misaligned {
            address,
            width: width.bytes(),
        });
    }
    Ok(())
}

impl PhysicalMemory for DevMem {
    fn load(&mut self, address: u64, width: Width) -> Result<u32, AccessError> {
        check_alignment(address, width)?;
        let ptr = self.acquire(address)?;
        // SAFETY: `ptr` is aligned to `width` and the whole access stays in the mapped page
        let value = unsafe {
            match width {
                Width::Byte => ptr::read_volatile(ptr) as u32,
                Width::Halfword => ptr::read_volatile(ptr.cast::<u16>()) as u32,
                Width::Word => ptr::read_volatile(ptr.cast::<u32>()),
            }
        };
        Ok(value)
    }

    fn store(&mut self, address: u64, width: Width, value: u32) -> Result<(), AccessError> {
        check_alignment(address, width)?;
        let ptr = self.acquire(address)?;
        // SAFETY: same as `load`
        unsafe {
            match width {
                Width::Byte => ptr::write_volatile(ptr, value as u8),
                Width::Halfword => ptr::write_volatile(ptr.cast::<u16>(), value as u16),
                Width::Word => ptr::write_volatile(ptr.cast::<u32>(), value),
            }
        }
        Ok(())
    }
}

/// Raw register value before and after a write.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct WriteOutcome {
    pub prior: u32,
    pub new: u32,
}

pub struct Accessor<M> {
    memory: M,
}

impl<M: PhysicalMemory> Accessor<M> {
    pub fn new(memory: M) -> Self {
        Self { memory }
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    pub fn into_inner(self) -> M {
        self.memory
    }

    /// Raw value of the whole register, fields are not applied.
    pub fn read(&mut self, target: &ResolvedTarget<'_>) -> Result<u32, AccessError> {
        self.memory.load(target.address, target.width)
    }

    /// Writes the whole register, or read-modify-writes its single field.
    ///
    /// Range problems are detected before the register is touched at all.
    pub fn write(
        &mut self,
        target: &ResolvedTarget<'_>,
        value: u32,
    ) -> Result<WriteOutcome, AccessError> {
        let width_mask = target.width.mask();
        let field = match target.fields.as_slice() {
            [] => None,
            [field] => {
                if field.mask() & !width_mask != 0 {
                    return Err(AccessError::FieldOutsideWidth {
                        register: target.label(),
                        field: field.name.clone(),
                    });
                }
                if value > field.max_value() {
                    return Err(AccessError::ValueOutOfRange {
                        register: target.label(),
                        value,
                        max: field.max_value(),
                    });
                }
                Some(field)
            }
            fields => {
                return Err(AccessError::MultipleFields {
                    register: target.label(),
                    count: fields.len(),
                })
            }
        };

        let prior = self.memory.load(target.address, target.width)?;
        let new = match field {
            Some(field) => field
                .insert(prior, value)
                .ok_or_else(|| AccessError::ValueOutOfRange {
                    register: target.label(),
                    value,
                    max: field.max_value(),
                })?,
            None => {
                if value & !width_mask != 0 {
                    log::warn!(
                        "{value:#x} truncated to {:#x} for {}-byte register {}",
                        value & width_mask,
                        target.width.bytes(),
                        target.label()
                    );
                }
                value & width_mask
            }
        };
        self.memory.store(target.address, target.width, new)?;
        Ok(WriteOutcome { prior, new })
    }
}


#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::{mock::MockMemory, *};
    use crate::catalog::FieldDescriptor;

    fn target(width: Width, fields: Vec<FieldDescriptor>) -> ResolvedTarget<'static> {
        ResolvedTarget {
            fields,
            ..ResolvedTarget::unnamed(0x1000, width)
        }
    }

    fn field(startbit: u32, bitcount: u32) -> FieldDescriptor {
        FieldDescriptor {
            name: "F".into(),
            startbit,
            bitcount,
        }
    }

    #[test]
    fn field_read_modify_write() {
        let mut accessor = Accessor::new(MockMemory::with(0x1000, 0xF0));
        let outcome = accessor
            .write(&target(Width::Word, vec![field(4, 4)]), 0xA)
            .unwrap();
        assert_eq!(
            outcome,
            WriteOutcome {
                prior: 0xF0,
                new: 0xA0
            }
        );
        assert_eq!(accessor.memory().cells[&0x1000], 0xA0);
    }

    #[test]
    fn out_of_range_leaves_register_alone() {
        let mut accessor = Accessor::new(MockMemory::with(0x1000, 0xF0));
        let err = accessor
            .write(&target(Width::Word, vec![field(4, 4)]), 0x10)
            .unwrap_err();
        assert!(matches!(
            err,
            AccessError::ValueOutOfRange {
                value: 0x10,
                max: 0xF,
                ..
            }
        ));
        assert!(!err.is_fatal());
        assert_eq!(accessor.memory().cells[&0x1000], 0xF0);
        assert_eq!(accessor.memory().stores, 0);
    }

    #[test]
    fn full_register_write_truncates_to_width() {
        let mut accessor = Accessor::new(MockMemory::with(0x1000, 0xFFFF_FF12));
        let outcome = accessor
            .write(&target(Width::Byte, vec![]), 0x1234)
            .unwrap();
        assert_eq!(
            outcome,
            WriteOutcome {
                prior: 0x12,
                new: 0x34
            }
        );
        assert_eq!(accessor.memory().cells[&0x1000], 0xFFFF_FF34);

        let outcome = accessor.write(&target(Width::Word, vec![]), 0xDEADBEEF).unwrap();
        assert_eq!(outcome.new, 0xDEADBEEF);
    }

    #[test]
    fn field_wider_than_access_is_refused() {
        let mut accessor = Accessor::new(MockMemory::default());
        let err = accessor
            .write(&target(Width::Halfword, vec![field(12, 8)]), 1)
            .unwrap_err();
        assert!(matches!(err, AccessError::FieldOutsideWidth { .. }));
        assert_eq!(accessor.memory().stores, 0);
    }

    #[test]
    fn several_fields_are_refused() {
        let mut accessor = Accessor::new(MockMemory::default());
        let err = accessor
            .write(&target(Width::Word, vec![field(0, 1), field(1, 1)]), 1)
            .unwrap_err();
        assert!(matches!(err, AccessError::MultipleFields { count: 2, .. }));
        assert_eq!(accessor.memory().stores, 0);
    }

    #[test]
    fn read_ignores_fields() {
        let mut accessor = Accessor::new(MockMemory::with(0x1000, 0xABCD));
        let raw = accessor.read(&target(Width::Word, vec![field(0, 4)])).unwrap();
        assert_eq!(raw, 0xABCD);
    }

    #[test]
    fn missing_device_is_fatal() {
        let mut memory = DevMem::with_path("/nonexistent/mem");
        let err = memory.load(0x1000, Width::Word).unwrap_err();
        assert!(matches!(err, AccessError::Open { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn misaligned_access() {
        let mut memory = DevMem::with_path("/nonexistent/mem");
        let err = memory.load(0x1002, Width::Word).unwrap_err();
        assert!(matches!(
            err,
            AccessError::Misaligned {
                address: 0x1002,
                width: 4
            }
        ));
    }

    #[test]
    fn dev_mem_over_a_plain_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut image = vec![0u8; 3 * PAGE_SIZE as usize];
        image[0x1004..0x1008].copy_from_slice(&0x1122_3344u32.to_ne_bytes());
        file.write_all(&image).unwrap();
        file.flush().unwrap();

        let mut memory = DevMem::with_path(file.path());
        assert_eq!(memory.load(0x1004, Width::Word).unwrap(), 0x1122_3344);
        assert_eq!(memory.window.as_ref().unwrap().page, 0x1000);

        memory.store(0x2000, Width::Halfword, 0xBEEF).unwrap();
        assert_eq!(memory.window.as_ref().unwrap().page, 0x2000);
        assert_eq!(memory.load(0x2000, Width::Halfword).unwrap(), 0xBEEF);
        let low_byte = 0xBEEFu16.to_ne_bytes()[0];
        assert_eq!(memory.load(0x2000, Width::Byte).unwrap(), low_byte as u32);

        // back to the first page, the earlier value is still there
        let low_half = u16::from_ne_bytes([image[0x1004], image[0x1005]]);
        assert_eq!(
            memory.load(0x1004, Width::Halfword).unwrap(),
            low_half as u32
        );
        assert_eq!(memory.window.as_ref().unwrap().page, 0x1000);
    }
}
