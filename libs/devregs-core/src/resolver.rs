//! Turns a command line token such as `gpio1_dr:3-5` or `0x020e0000.w` into
//! concrete registers from a [`Catalog`].

use nom::combinator::all_consuming;

use crate::{
    bits::{is_bit_range, parse_bits},
    catalog::{Catalog, FieldDescriptor, RegisterDescriptor, RegisterEntry, Width},
    error::ResolveError,
    loader::{hex_address, identifier, width_suffix},
};

/// A register picked by a specifier, carrying only the fields that were asked for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedTarget<'c> {
    pub address: u64,
    pub width: Width,
    pub register: Option<&'c RegisterDescriptor>,
    pub fields: Vec<FieldDescriptor>,
    /// Field name given in the specifier, kept even when this register has no such field
    pub field_query: Option<String>,
}

impl<'c> ResolvedTarget<'c> {
    pub fn from_entry(catalog: &'c Catalog, entry: &RegisterEntry) -> Self {
        Self {
            address: entry.address,
            width: entry.width,
            register: catalog.descriptor_of(entry),
            fields: entry.fields.clone(),
            field_query: None,
        }
    }

    /// An address that is not in the catalog
    pub fn unnamed(address: u64, width: Width) -> Self {
        Self {
            address,
            width,
            register: None,
            fields: Vec::new(),
            field_query: None,
        }
    }

    pub fn name(&self) -> &str {
        self.register.map_or("", |register| register.name.as_str())
    }

    /// Name, or the address for unnamed targets.
    pub fn label(&self) -> String {
        match self.register {
            Some(register) => register.name.clone(),
            None => format!("{:#010x}", self.address),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Specifier<'s> {
    Name {
        name: &'s str,
        field: Option<&'s str>,
    },
    Address {
        address: u64,
        width: Option<Width>,
        bits: Option<&'s str>,
    },
}

fn parse_specifier(spec: &str) -> Result<Specifier<'_>, ResolveError> {
    let invalid = || ResolveError::InvalidSpecifier(spec.to_string());
    match spec.chars().next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            let (rest, name) = identifier(spec).map_err(|_| invalid())?;
            let field = match rest.chars().next() {
                None => None,
                Some('.' | ':') if rest.len() > 1 => Some(&rest[1..]),
                Some(_) => return Err(invalid()),
            };
            if let Some(field) = field {
                let valid = is_bit_range(field)
                    || field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
                if !valid {
                    return Err(invalid());
                }
            }
            Ok(Specifier::Name { name, field })
        }
        Some(c) if c.is_ascii_digit() => {
            let (rest, address) = hex_address(spec).map_err(|_| invalid())?;
            if let Some(bits) = rest.strip_prefix(':') {
                return Ok(Specifier::Address {
                    address,
                    width: None,
                    bits: Some(bits),
                });
            }
            let (rest, suffix) = width_suffix(rest).map_err(|_| invalid())?;
            if !rest.is_empty() {
                return Err(invalid());
            }
            let width = suffix
                .map(|c| Width::from_suffix(c).ok_or(ResolveError::InvalidWidth(c)))
                .transpose()?;
            Ok(Specifier::Address {
                address,
                width,
                bits: None,
            })
        }
        _ => Err(invalid()),
    }
}

fn bit_field(spec: &str) -> Result<FieldDescriptor, ResolveError> {
    let (startbit, bitcount) = parse_bits(spec).map_err(ResolveError::InvalidBits)?;
    Ok(FieldDescriptor {
        name: spec.to_string(),
        startbit,
        bitcount,
    })
}

fn has_prefix_ignore_case(name: &str, query: &str) -> bool {
    name.get(..query.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(query))
}

/// Every register `spec` refers to, in catalog order.
///
/// Names match by case-insensitive prefix, so `gpio` selects `GPIO1_DR` and `GPIO2_DR`.
/// When a named field is given, registers without such a field are kept with no fields.
/// An empty result is not an error.
pub fn resolve<'c>(catalog: &'c Catalog, spec: &str) -> Result<Vec<ResolvedTarget<'c>>, ResolveError> {
    let targets = match parse_specifier(spec)? {
        Specifier::Name { name, field } => {
            let bits = match field {
                Some(field) if is_bit_range(field) => Some(bit_field(field)?),
                _ => None,
            };
            let mut targets = Vec::new();
            for entry in catalog.entries() {
                let Some(register) = catalog.descriptor_of(entry) else {
                    continue;
                };
                if !has_prefix_ignore_case(&register.name, name) {
                    continue;
                }
                let mut target = ResolvedTarget::from_entry(catalog, entry);
                match (&bits, field) {
                    (Some(bits), _) => target.fields = vec![bits.clone()],
                    (None, Some(field)) => {
                        target
                            .fields
                            .retain(|candidate| candidate.name.eq_ignore_ascii_case(field));
                        target.field_query = Some(field.to_string());
                    }
                    (None, None) => {}
                }
                targets.push(target);
            }
            targets
        }
        Specifier::Address {
            address,
            width,
            bits,
        } => {
            let bits = match bits {
                Some(bits) if bits.is_empty() || is_bit_range(bits) => Some(bit_field(bits)?),
                Some(_) => return Err(ResolveError::NamedFieldOnAddress(spec.to_string())),
                None => None,
            };
            let mut target = match catalog.find_by_address(address) {
                Some(entry) => ResolvedTarget::from_entry(catalog, entry),
                None => ResolvedTarget::unnamed(address, Width::Word),
            };
            if let Some(width) = width {
                target.width = width;
            }
            if let Some(bits) = bits {
                target.fields = vec![bits];
            }
            vec![target]
        }
    };
    log::debug!("{spec} resolved to {} registers", targets.len());
    Ok(targets)
}

/// The single register a write of one value may go to.
///
/// One scalar cannot be spread over several registers or several fields, and a
/// named field the register lacks must not turn into a whole-register write.
/// Anything else is refused before hardware is touched.
pub fn write_target<'a, 'c>(
    spec: &str,
    targets: &'a [ResolvedTarget<'c>],
) -> Result<&'a ResolvedTarget<'c>, ResolveError> {
    match targets {
        [] => Err(ResolveError::NothingMatched(spec.to_string())),
        [target] => match (&target.field_query, target.fields.len()) {
            (Some(field), 0) => Err(ResolveError::NoSuchField {
                register: target.label(),
                field: field.clone(),
            }),
            (_, 0 | 1) => Ok(target),
            (_, count) => Err(ResolveError::AmbiguousFields {
                register: target.label(),
                count,
            }),
        },
        _ => Err(ResolveError::AmbiguousRegisters {
            count: targets.len(),
        }),
    }
}

/// Hex value to write, `0x` optional.
pub fn parse_value(token: &str) -> Result<u32, ResolveError> {
    all_consuming(hex_address)(token)
        .ok()
        .and_then(|(_, value)| u32::try_from(value).ok())
        .ok_or_else(|| ResolveError::InvalidValue(token.to_string()))
}
