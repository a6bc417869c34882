/// Access width of a register.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Width {
    Byte,
    Halfword,
    #[default]
    Word,
}

impl Width {
    /// `.b`, `.w` and `.l` suffixes, case-insensitive
    pub fn from_suffix(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            'b' => Some(Width::Byte),
            'w' => Some(Width::Halfword),
            'l' => Some(Width::Word),
            _ => None,
        }
    }

    pub fn bytes(self) -> usize {
        match self {
            Width::Byte => 1,
            Width::Halfword => 2,
            Width::Word => 4,
        }
    }

    pub fn bits(self) -> u32 {
        self.bytes() as u32 * 8
    }

    pub fn mask(self) -> u32 {
        crate::bits::low_mask(self.bits())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    pub startbit: u32,
    pub bitcount: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterDescriptor {
    pub name: String,
    /// Fields declared on this register's own field lines
    pub fields: Vec<FieldDescriptor>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldSet {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RegisterId(usize);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterEntry {
    pub address: u64,
    pub width: Width,
    pub register: Option<RegisterId>,
    /// Own fields followed by any included field sets
    pub fields: Vec<FieldDescriptor>,
}

/// Registers of one definition file, in file order.
///
/// Built once by the loader and never modified afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Catalog {
    entries: Vec<RegisterEntry>,
    registers: Vec<RegisterDescriptor>,
}

impl Catalog {
    pub fn entries(&self) -> &[RegisterEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn register(&self, id: RegisterId) -> &RegisterDescriptor {
        &self.registers[id.0]
    }

    pub fn descriptor_of(&self, entry: &RegisterEntry) -> Option<&RegisterDescriptor> {
        entry.register.map(|id| self.register(id))
    }

    /// First entry at `address`; duplicates further down are shadowed.
    pub fn find_by_address(&self, address: u64) -> Option<&RegisterEntry> {
        self.entries.iter().find(|entry| entry.address == address)
    }

    pub(crate) fn push_register(&mut self, name: String, address: u64, width: Width) {
        let id = RegisterId(self.registers.len());
        self.registers.push(RegisterDescriptor {
            name,
            fields: Vec::new(),
        });
        self.entries.push(RegisterEntry {
            address,
            width,
            register: Some(id),
            fields: Vec::new(),
        });
    }

    /// Puts `fields` in front of the most recent register's fields.
    pub(crate) fn prepend_fields(&mut self, fields: Vec<FieldDescriptor>) {
        let (Some(register), Some(entry)) = (self.registers.last_mut(), self.entries.last_mut())
        else {
            return;
        };
        register.fields.splice(0..0, fields.iter().cloned());
        entry.fields.splice(0..0, fields);
    }

    pub(crate) fn append_entry_fields(&mut self, fields: &[FieldDescriptor]) {
        if let Some(entry) = self.entries.last_mut() {
            entry.fields.extend_from_slice(fields);
        }
    }

    /// Copies of every field named `name` declared on any register so far.
    pub(crate) fn declared_fields_named(&self, name: &str) -> Vec<FieldDescriptor> {
        self.registers
            .iter()
            .flat_map(|register| register.fields.iter())
            .filter(|field| field.name.eq_ignore_ascii_case(name))
            .cloned()
            .collect()
    }
}
