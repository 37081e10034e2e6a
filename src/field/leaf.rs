//! # Leaf Scalar Kinds
//!
//! One column, bijective mapping between the in-memory scalar and the column
//! element. Each kind declares its natural column encodings: split encodings
//! are the write defaults for multi-byte integers, reals, and cluster-size
//! counters (downgradable per write options); deserialization extras allow
//! widening reads from narrower stored elements.

use crate::column::{ColumnType, ElementClass};
use crate::field::Representations;
use crate::value::Datum;
use eyre::Result;

/// Scalar kinds. `Index` is the cluster-size counter type used by offset
/// columns; it is a leaf in its own right so collection internals stay
/// expressible as ordinary fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LeafKind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Index,
}

const BOOL_REPS: Representations = Representations {
    serialization: &[&[ColumnType::Bit]],
    deserialization_extra: &[&[ColumnType::Byte]],
};

const I8_REPS: Representations = Representations {
    serialization: &[&[ColumnType::Int8]],
    deserialization_extra: &[],
};

const I16_REPS: Representations = Representations {
    serialization: &[&[ColumnType::SplitInt16], &[ColumnType::Int16]],
    deserialization_extra: &[&[ColumnType::Int8]],
};

const I32_REPS: Representations = Representations {
    serialization: &[&[ColumnType::SplitInt32], &[ColumnType::Int32]],
    deserialization_extra: &[&[ColumnType::SplitInt16], &[ColumnType::Int16], &[ColumnType::Int8]],
};

const I64_REPS: Representations = Representations {
    serialization: &[&[ColumnType::SplitInt64], &[ColumnType::Int64]],
    deserialization_extra: &[
        &[ColumnType::SplitInt32],
        &[ColumnType::Int32],
        &[ColumnType::SplitInt16],
        &[ColumnType::Int16],
        &[ColumnType::Int8],
    ],
};

const U8_REPS: Representations = Representations {
    serialization: &[&[ColumnType::UInt8], &[ColumnType::Byte]],
    deserialization_extra: &[],
};

const U16_REPS: Representations = Representations {
    serialization: &[&[ColumnType::UInt16]],
    deserialization_extra: &[&[ColumnType::UInt8]],
};

const U32_REPS: Representations = Representations {
    serialization: &[&[ColumnType::UInt32]],
    deserialization_extra: &[&[ColumnType::UInt16], &[ColumnType::UInt8]],
};

const U64_REPS: Representations = Representations {
    serialization: &[&[ColumnType::UInt64]],
    deserialization_extra: &[
        &[ColumnType::UInt32],
        &[ColumnType::UInt16],
        &[ColumnType::UInt8],
    ],
};

const F32_REPS: Representations = Representations {
    serialization: &[&[ColumnType::SplitReal32], &[ColumnType::Real32]],
    deserialization_extra: &[],
};

const F64_REPS: Representations = Representations {
    serialization: &[&[ColumnType::SplitReal64], &[ColumnType::Real64]],
    deserialization_extra: &[&[ColumnType::SplitReal32], &[ColumnType::Real32]],
};

const INDEX_LEAF_REPS: Representations = Representations {
    serialization: &[
        &[ColumnType::SplitIndex64],
        &[ColumnType::Index64],
        &[ColumnType::SplitIndex32],
        &[ColumnType::Index32],
    ],
    deserialization_extra: &[],
};

impl LeafKind {
    /// Slot width in bytes.
    pub fn size(&self) -> usize {
        match self {
            LeafKind::Bool | LeafKind::I8 | LeafKind::U8 => 1,
            LeafKind::I16 | LeafKind::U16 => 2,
            LeafKind::I32 | LeafKind::U32 | LeafKind::F32 => 4,
            LeafKind::I64 | LeafKind::U64 | LeafKind::F64 | LeafKind::Index => 8,
        }
    }

    /// Slot alignment; equal to the width for scalars.
    pub fn align(&self) -> usize {
        self.size()
    }

    pub fn class(&self) -> ElementClass {
        match self {
            LeafKind::Bool => ElementClass::Bool,
            LeafKind::I8 | LeafKind::I16 | LeafKind::I32 | LeafKind::I64 => ElementClass::Int,
            LeafKind::U8 | LeafKind::U16 | LeafKind::U32 | LeafKind::U64 => ElementClass::UInt,
            LeafKind::F32 | LeafKind::F64 => ElementClass::Float,
            LeafKind::Index => ElementClass::Index,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            LeafKind::Bool => "bool",
            LeafKind::I8 => "i8",
            LeafKind::I16 => "i16",
            LeafKind::I32 => "i32",
            LeafKind::I64 => "i64",
            LeafKind::U8 => "u8",
            LeafKind::U16 => "u16",
            LeafKind::U32 => "u32",
            LeafKind::U64 => "u64",
            LeafKind::F32 => "f32",
            LeafKind::F64 => "f64",
            LeafKind::Index => "index",
        }
    }

    /// Inverse of [`type_name`](Self::type_name).
    pub fn parse(name: &str) -> Option<LeafKind> {
        Some(match name {
            "bool" => LeafKind::Bool,
            "i8" => LeafKind::I8,
            "i16" => LeafKind::I16,
            "i32" => LeafKind::I32,
            "i64" => LeafKind::I64,
            "u8" => LeafKind::U8,
            "u16" => LeafKind::U16,
            "u32" => LeafKind::U32,
            "u64" => LeafKind::U64,
            "f32" => LeafKind::F32,
            "f64" => LeafKind::F64,
            "index" => LeafKind::Index,
            _ => return None,
        })
    }

    pub fn representations(&self) -> Representations {
        match self {
            LeafKind::Bool => BOOL_REPS,
            LeafKind::I8 => I8_REPS,
            LeafKind::I16 => I16_REPS,
            LeafKind::I32 => I32_REPS,
            LeafKind::I64 => I64_REPS,
            LeafKind::U8 => U8_REPS,
            LeafKind::U16 => U16_REPS,
            LeafKind::U32 => U32_REPS,
            LeafKind::U64 => U64_REPS,
            LeafKind::F32 => F32_REPS,
            LeafKind::F64 => F64_REPS,
            LeafKind::Index => INDEX_LEAF_REPS,
        }
    }

    /// Writes a literal into a slot of this kind.
    pub(crate) fn encode(&self, slot: &mut [u8], datum: &Datum) -> Result<()> {
        match (self, datum) {
            (LeafKind::Bool, Datum::Bool(v)) => slot[0] = *v as u8,
            (LeafKind::I8, Datum::I8(v)) => slot.copy_from_slice(&v.to_le_bytes()),
            (LeafKind::I16, Datum::I16(v)) => slot.copy_from_slice(&v.to_le_bytes()),
            (LeafKind::I32, Datum::I32(v)) => slot.copy_from_slice(&v.to_le_bytes()),
            (LeafKind::I64, Datum::I64(v)) => slot.copy_from_slice(&v.to_le_bytes()),
            (LeafKind::U8, Datum::U8(v)) => slot.copy_from_slice(&v.to_le_bytes()),
            (LeafKind::U16, Datum::U16(v)) => slot.copy_from_slice(&v.to_le_bytes()),
            (LeafKind::U32, Datum::U32(v)) => slot.copy_from_slice(&v.to_le_bytes()),
            (LeafKind::U64, Datum::U64(v)) => slot.copy_from_slice(&v.to_le_bytes()),
            (LeafKind::F32, Datum::F32(v)) => slot.copy_from_slice(&v.to_le_bytes()),
            (LeafKind::F64, Datum::F64(v)) => slot.copy_from_slice(&v.to_le_bytes()),
            (LeafKind::Index, Datum::Index(v)) => slot.copy_from_slice(&v.to_le_bytes()),
            (kind, datum) => eyre::bail!(
                "{} leaf cannot encode {} datum",
                kind.type_name(),
                datum.kind_name()
            ),
        }
        Ok(())
    }

    /// Reads a literal back from a slot of this kind.
    pub(crate) fn decode(&self, slot: &[u8]) -> Datum {
        match self {
            LeafKind::Bool => Datum::Bool(slot[0] != 0),
            LeafKind::I8 => Datum::I8(i8::from_le_bytes([slot[0]])),
            LeafKind::I16 => Datum::I16(i16::from_le_bytes([slot[0], slot[1]])),
            LeafKind::I32 => Datum::I32(i32::from_le_bytes([slot[0], slot[1], slot[2], slot[3]])),
            LeafKind::I64 => Datum::I64(i64::from_le_bytes([
                slot[0], slot[1], slot[2], slot[3], slot[4], slot[5], slot[6], slot[7],
            ])),
            LeafKind::U8 => Datum::U8(slot[0]),
            LeafKind::U16 => Datum::U16(u16::from_le_bytes([slot[0], slot[1]])),
            LeafKind::U32 => Datum::U32(u32::from_le_bytes([slot[0], slot[1], slot[2], slot[3]])),
            LeafKind::U64 => Datum::U64(u64::from_le_bytes([
                slot[0], slot[1], slot[2], slot[3], slot[4], slot[5], slot[6], slot[7],
            ])),
            LeafKind::F32 => Datum::F32(f32::from_le_bytes([slot[0], slot[1], slot[2], slot[3]])),
            LeafKind::F64 => Datum::F64(f64::from_le_bytes([
                slot[0], slot[1], slot[2], slot[3], slot[4], slot[5], slot[6], slot[7],
            ])),
            LeafKind::Index => Datum::Index(u64::from_le_bytes([
                slot[0], slot[1], slot[2], slot[3], slot[4], slot[5], slot[6], slot[7],
            ])),
        }
    }
}
