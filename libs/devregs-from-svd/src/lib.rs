//! Generates devregs definition files from CMSIS-SVD device descriptions.

use std::{
    fmt::Write as _,
    io,
    ops::{Deref, DerefMut},
};

use svd_rs::{Cluster, DimElement, MaybeArray, PeripheralInfoBuilder, Register};

/// Definition file text for every register of `device`.
pub fn to_definitions(device: svd_rs::Device) -> String {
    let device = expand_derived_from_attribute(device);
    let mut out = String::new();
    let device_size = device.default_register_properties.size;
    for peripheral in device.peripherals.iter() {
        let peripheral = peripheral.deref();
        let prefix = identifier(&peripheral.name);
        let base_address = peripheral.base_address;
        let size = peripheral.default_register_properties.size.or(device_size);
        line(&mut out, format_args!("{prefix}_BASE\t\t{base_address:#010x}"));
        for register in peripheral.registers() {
            emit_register(&mut out, &prefix, base_address, register, size);
        }
        for cluster in peripheral.clusters() {
            emit_cluster(&mut out, &prefix, base_address, cluster, size);
        }
    }
    out
}

pub fn write_definitions(device: svd_rs::Device, mut out: impl io::Write) -> io::Result<()> {
    out.write_all(to_definitions(device).as_bytes())?;
    out.flush()
}

fn line(out: &mut String, args: std::fmt::Arguments<'_>) {
    // Writing into a String cannot fail
    let _ = out.write_fmt(args);
    out.push('\n');
}

fn emit_cluster(out: &mut String, prefix: &str, base_address: u64, cluster: &Cluster, size: Option<u32>) {
    let (info, dim) = split(cluster);
    let size = info.default_register_properties.size.or(size);
    for (name, step) in instances(&info.name, dim) {
        let prefix = format!("{prefix}_{}", identifier(&name));
        let base_address = base_address + info.address_offset as u64 + step;
        for register in info.registers() {
            emit_register(out, &prefix, base_address, register, size);
        }
        for cluster in info.clusters() {
            emit_cluster(out, &prefix, base_address, cluster, size);
        }
    }
}

fn emit_register(out: &mut String, prefix: &str, base_address: u64, register: &Register, size: Option<u32>) {
    let (info, dim) = split(register);
    let suffix = match info.properties.size.or(size) {
        Some(8) => ".b",
        Some(16) => ".w",
        None | Some(32) => "",
        Some(other) => {
            log::warn!(
                "{prefix}_{}: {other} bit registers are accessed as 32 bits",
                info.name
            );
            ""
        }
    };
    for (name, step) in instances(&info.name, dim) {
        let address = base_address + info.address_offset as u64 + step;
        line(
            out,
            format_args!("{prefix}_{}\t\t{address:#010x}{suffix}", identifier(&name)),
        );
        for field in info.fields() {
            let (field_info, field_dim) = split(field);
            let offset = field_info.bit_range.offset;
            let width = field_info.bit_range.width;
            for (field_name, field_step) in instances(&field_info.name, field_dim) {
                let start = offset + field_step as u32;
                let end = start + width - 1;
                if end >= 32 {
                    log::warn!("{prefix}_{name}.{field_name}: bits {start}-{end} skipped");
                    continue;
                }
                let field_name = identifier(&field_name);
                if width > 1 {
                    line(out, format_args!("\t:{prefix}_{field_name}:{start}-{end}"));
                } else {
                    line(out, format_args!("\t:{prefix}_{field_name}:{start}"));
                }
            }
        }
    }
}

fn split<T>(item: &MaybeArray<T>) -> (&T, Option<&DimElement>) {
    match item {
        MaybeArray::Single(info) => (info, None),
        MaybeArray::Array(info, dim) => (info, Some(dim)),
    }
}

/// Names and address steps of every element of a possibly `dim`-ed item.
fn instances(name: &str, dim: Option<&DimElement>) -> Vec<(String, u64)> {
    let Some(dim) = dim else {
        return vec![(name.to_string(), 0)];
    };
    let indexes: Vec<String> = match &dim.dim_index {
        Some(indexes) => indexes.clone(),
        None => (0..dim.dim).map(|i| i.to_string()).collect(),
    };
    indexes
        .into_iter()
        .enumerate()
        .map(|(i, index)| {
            let name = name.replace("[%s]", &index).replace("%s", &index);
            (name, i as u64 * dim.dim_increment as u64)
        })
        .collect()
}

/// Anything outside `[A-Za-z0-9_]` becomes `_`, the definition format knows no other name characters.
fn identifier(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn expand_derived_from_attribute(mut device: svd_rs::Device) -> svd_rs::Device {
    let device_copy = device.clone();
    for peripheral in device
        .peripherals
        .iter_mut()
        .filter(|v| v.derived_from.is_some())
    {
        let peripheral = peripheral.deref_mut();
        let Some(derived_from) = peripheral.derived_from.clone() else {
            continue;
        };
        let Some(derived_from_peripheral) = device_copy.get_peripheral(&derived_from) else {
            log::warn!(
                "{} derived from {} but the latter does not exist? Skipping",
                &peripheral.name,
                derived_from
            );
            continue;
        };
        let peripheral_as_builder =
            PeripheralInfoBuilder::from(peripheral.clone()).derived_from(None);
        let mut merged = derived_from_peripheral.deref().clone();
        if let Err(e) = merged.modify_from(peripheral_as_builder, Default::default()) {
            log::warn!("Cannot apply {} on top of {derived_from}: {e}", &peripheral.name);
            continue;
        }
        if let Err(e) = peripheral.modify_from(merged.into(), Default::default()) {
            log::warn!("Cannot expand {}: {e}", &peripheral.name);
            continue;
        }
        peripheral.derived_from = None;
    }
    if device
        .peripherals
        .iter()
        .any(|v| v.derived_from.is_some())
    {
        log::warn!("Multi-pass derivedFrom peripherals expansion is not implemented, YMMV.");
    }
    device
}
