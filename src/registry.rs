//! # Type Registry and Field Factory
//!
//! Reflection-driven field construction. The registry is an injected
//! collaborator mapping type names to ordered member descriptors; it stands
//! in for whatever dictionary or schema catalog the embedding system keeps.
//! [`build_field`] parses the crate's type grammar and resurrects a field
//! tree from a name:
//!
//! | Spelling | Field |
//! |----------|-------|
//! | `bool`, `i8`..`i64`, `u8`..`u64`, `f32`, `f64`, `index` | leaf |
//! | `string` | string |
//! | `vec<T>` | vector |
//! | `set<T>` | set |
//! | `array<T, N>` | fixed array |
//! | `option<T>` | nullable |
//! | `variant<T1, .., Tn>` | tagged union |
//! | `atomic<T>` | atomic wrapper |
//! | `bitset<N>` | bitset |
//! | registered struct name | record (bases flattened first, `:` prefix) |
//! | registered enum name | enum over its underlying integer |
//!
//! Member offsets reported by a registry are informational only; record
//! layout is always computed by this crate's own layout walk. Cardinality
//! and adapter-backed proxied collections are constructed directly through
//! their `Field` constructors, not through the grammar.

use crate::field::{Field, LeafKind};
use eyre::Result;
use hashbrown::HashMap;

/// One member of a registered composite type, in declaration order.
#[derive(Debug, Clone)]
pub struct MemberInfo {
    pub name: String,
    pub type_name: String,
    /// True for inherited base components; their members are flattened in
    /// front of the data members, under a `:`-prefixed sub-record.
    pub is_base: bool,
}

impl MemberInfo {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            is_base: false,
        }
    }

    pub fn base(type_name: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            type_name: type_name.into(),
            is_base: true,
        }
    }
}

#[derive(Debug, Clone)]
pub enum TypeKind {
    Struct,
    Enum {
        /// Leaf spelling of the discriminant type, e.g. "i32".
        underlying: String,
    },
}

/// Everything the factory needs to know about a registered named type.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    pub name: String,
    pub version: u32,
    pub kind: TypeKind,
    pub members: Vec<MemberInfo>,
}

/// Injected reflection collaborator.
pub trait TypeRegistry {
    fn lookup(&self, type_name: &str) -> Option<&TypeInfo>;
}

/// Simple owned registry; sufficient for tests and embedded models.
#[derive(Debug, Default)]
pub struct MapRegistry {
    types: HashMap<String, TypeInfo>,
}

impl MapRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, info: TypeInfo) {
        self.types.insert(info.name.clone(), info);
    }
}

impl TypeRegistry for MapRegistry {
    fn lookup(&self, type_name: &str) -> Option<&TypeInfo> {
        self.types.get(type_name)
    }
}

/// Builds a field tree for `type_name`, resolving named types through the
/// registry. Fails before any tree is assembled; no partially constructed
/// fields escape.
pub fn build_field(name: &str, type_name: &str, registry: &dyn TypeRegistry) -> Result<Field> {
    let ty = type_name.trim();

    if let Some(kind) = LeafKind::parse(ty) {
        return Field::leaf(name, kind);
    }
    if ty == "string" {
        return Field::string(name);
    }
    if let Some(inner) = generic_args("vec", ty) {
        return Field::vector(name, build_field("_0", inner, registry)?);
    }
    if let Some(inner) = generic_args("set", ty) {
        return Field::set(name, build_field("_0", inner, registry)?);
    }
    if let Some(inner) = generic_args("option", ty) {
        return Field::nullable(name, build_field("_0", inner, registry)?);
    }
    if let Some(inner) = generic_args("atomic", ty) {
        return Field::atomic(name, build_field("_0", inner, registry)?);
    }
    if let Some(args) = generic_args("variant", ty) {
        let mut arms = Vec::new();
        for (i, arm) in split_top_level(args).into_iter().enumerate() {
            arms.push(build_field(&format!("_{}", i), arm, registry)?);
        }
        return Field::variant(name, arms);
    }
    if let Some(args) = generic_args("array", ty) {
        let parts = split_top_level(args);
        eyre::ensure!(
            parts.len() == 2,
            "array type '{}' must spell exactly 'array<T, N>'",
            ty
        );
        let len: usize = parts[1]
            .trim()
            .parse()
            .map_err(|_| eyre::eyre!("invalid array length '{}' in '{}'", parts[1].trim(), ty))?;
        return Field::array(name, build_field("_0", parts[0], registry)?, len);
    }
    if let Some(arg) = generic_args("bitset", ty) {
        let n: usize = arg
            .trim()
            .parse()
            .map_err(|_| eyre::eyre!("invalid bitset size '{}' in '{}'", arg.trim(), ty))?;
        return Field::bitset(name, n);
    }

    let info = registry
        .lookup(ty)
        .ok_or_else(|| eyre::eyre!("unknown type name '{}'", ty))?;
    match &info.kind {
        TypeKind::Struct => {
            let mut members = Vec::with_capacity(info.members.len());
            for member in info.members.iter().filter(|m| m.is_base) {
                members.push(build_field(
                    &format!(":{}", member.type_name),
                    &member.type_name,
                    registry,
                )?);
            }
            for member in info.members.iter().filter(|m| !m.is_base) {
                members.push(build_field(&member.name, &member.type_name, registry)?);
            }
            let mut field = Field::record(name, info.name.as_str(), members)?;
            field.set_type_version(info.version);
            Ok(field)
        }
        TypeKind::Enum { underlying } => {
            let kind = LeafKind::parse(underlying).ok_or_else(|| {
                eyre::eyre!(
                    "enum '{}' has non-integer underlying type '{}'",
                    info.name,
                    underlying
                )
            })?;
            let mut field =
                Field::enumeration(name, info.name.as_str(), Field::leaf("_0", kind)?)?;
            field.set_type_version(info.version);
            Ok(field)
        }
    }
}

/// For `prefix<args>` returns `args`; angle brackets must balance.
fn generic_args<'a>(prefix: &str, ty: &'a str) -> Option<&'a str> {
    let rest = ty.strip_prefix(prefix)?;
    let rest = rest.strip_prefix('<')?;
    let rest = rest.strip_suffix('>')?;
    let mut depth = 0i32;
    for c in rest.chars() {
        match c {
            '<' => depth += 1,
            '>' => {
                depth -= 1;
                if depth < 0 {
                    return None;
                }
            }
            _ => {}
        }
    }
    (depth == 0).then_some(rest)
}

/// Splits on commas at angle-bracket depth zero.
fn split_top_level(args: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in args.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(args[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(args[start..].trim());
    parts
}
