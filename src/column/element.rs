//! # Column Element Codec
//!
//! Pure, stateless conversion between a value's in-memory slot bytes and the
//! packed on-disk representation of one column element. The codec also
//! performs width adaptation for deserialization-only encodings: a wide
//! in-memory scalar may be filled from a narrower stored element
//! (sign-extended, zero-extended, or float-widened according to the element
//! class).
//!
//! Split encodings are distinct column types negotiated with the backend;
//! at element granularity their packing equals the plain counterpart (the
//! byte transposition happens below this layer, in the excluded physical
//! store).

use crate::column::ColumnType;
use eyre::Result;
use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// How a column's elements are interpreted during width adaptation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementClass {
    Bool,
    Int,
    UInt,
    Float,
    /// Cluster-size counters (offset columns); unsigned.
    Index,
    /// Raw payload bytes (char columns).
    Bytes,
    /// Variant tag elements; packed and unpacked through the dedicated
    /// switch helpers, never through `pack`/`unpack`.
    Switch,
}

/// Packed element of a switch (tag) column: the cluster-local position in the
/// active arm's storage plus the 1-based arm tag.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub struct SwitchElement {
    pub index: U64,
    pub tag: U32,
}

pub const SWITCH_ELEMENT_SIZE: usize = 12;

pub fn pack_switch(item_index: u64, tag: u32) -> [u8; SWITCH_ELEMENT_SIZE] {
    let elem = SwitchElement {
        index: U64::new(item_index),
        tag: U32::new(tag),
    };
    let mut out = [0u8; SWITCH_ELEMENT_SIZE];
    out.copy_from_slice(elem.as_bytes());
    out
}

pub fn unpack_switch(packed: &[u8]) -> Result<(u64, u32)> {
    let elem = SwitchElement::read_from_bytes(packed)
        .map_err(|_| eyre::eyre!("switch element has wrong size: {} bytes", packed.len()))?;
    Ok((elem.index.get(), elem.tag.get()))
}

fn read_uint(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf[..bytes.len()].copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

fn read_int(bytes: &[u8]) -> i64 {
    let shift = 64 - 8 * bytes.len() as u32;
    ((read_uint(bytes) << shift) as i64) >> shift
}

fn write_uint(out: &mut [u8], value: u64) {
    out.copy_from_slice(&value.to_le_bytes()[..out.len()]);
}

/// Packs one in-memory slot into the element encoding of `ty`.
///
/// `out` must be exactly `ty.packed_size()` bytes. Narrowing packs are range
/// checked; a value that does not fit the stored width is an error, never a
/// silent truncation.
pub fn pack(ty: ColumnType, class: ElementClass, slot: &[u8], out: &mut [u8]) -> Result<()> {
    debug_assert_eq!(out.len(), ty.packed_size());

    if ty == ColumnType::Bit {
        out[0] = (slot[0] != 0) as u8;
        return Ok(());
    }
    if out.len() == slot.len() {
        out.copy_from_slice(slot);
        return Ok(());
    }
    if out.len() < slot.len() {
        match class {
            ElementClass::UInt | ElementClass::Index => {
                let value = read_uint(slot);
                let max = u64::MAX >> (64 - 8 * out.len() as u32);
                eyre::ensure!(
                    value <= max,
                    "value {} does not fit {}-byte {:?} element",
                    value,
                    out.len(),
                    ty
                );
                write_uint(out, value);
            }
            ElementClass::Int => {
                let value = read_int(slot);
                let bits = 8 * out.len() as u32;
                let min = -(1i64 << (bits - 1));
                let max = (1i64 << (bits - 1)) - 1;
                eyre::ensure!(
                    value >= min && value <= max,
                    "value {} does not fit {}-byte {:?} element",
                    value,
                    out.len(),
                    ty
                );
                write_uint(out, value as u64);
            }
            _ => eyre::bail!(
                "cannot narrow {:?} slot of {} bytes into {:?}",
                class,
                slot.len(),
                ty
            ),
        }
        return Ok(());
    }
    eyre::bail!(
        "cannot pack {}-byte slot into wider {:?} element",
        slot.len(),
        ty
    )
}

/// Unpacks one stored element into an in-memory slot, widening if the stored
/// encoding is narrower than the slot.
pub fn unpack(ty: ColumnType, class: ElementClass, packed: &[u8], slot: &mut [u8]) -> Result<()> {
    debug_assert_eq!(packed.len(), ty.packed_size());

    if ty == ColumnType::Bit {
        slot[0] = packed[0];
        return Ok(());
    }
    if packed.len() == slot.len() {
        slot.copy_from_slice(packed);
        return Ok(());
    }
    if packed.len() < slot.len() {
        match class {
            ElementClass::UInt | ElementClass::Index => write_uint(slot, read_uint(packed)),
            ElementClass::Int => write_uint(slot, read_int(packed) as u64),
            ElementClass::Float => {
                eyre::ensure!(
                    packed.len() == 4 && slot.len() == 8,
                    "unsupported float widening from {} to {} bytes",
                    packed.len(),
                    slot.len()
                );
                let narrow = f32::from_le_bytes(packed.try_into().unwrap());
                slot.copy_from_slice(&(narrow as f64).to_le_bytes());
            }
            _ => eyre::bail!(
                "cannot widen {:?} element {:?} into {}-byte slot",
                class,
                ty,
                slot.len()
            ),
        }
        return Ok(());
    }
    eyre::bail!(
        "stored {:?} element is wider than the {}-byte destination slot",
        ty,
        slot.len()
    )
}
