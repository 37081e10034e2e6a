//! # Generic Collection Adapters
//!
//! A proxied collection field serializes custom iterable types through an
//! injected adapter instead of assuming the canonical contiguous layout. The
//! iteration strategy is selected once, at field construction:
//!
//! - [`IterStrategy::Contiguous`]: items are heap-packed at the item stride;
//!   iteration is pointer arithmetic, no adapter calls per element. Preferred
//!   whenever the collection can expose contiguous storage.
//! - [`IterStrategy::Cursor`]: iteration goes through the adapter's
//!   `for_each`, one callback per element (the pointer-chasing fallback).
//!
//! Reads always materialize the canonical contiguous representation.

use crate::value::{self, ValueRef};
use eyre::Result;
use std::sync::Arc;

/// Type-erasure adapter over a custom collection representation.
pub trait CollectionAdapter: Send + Sync {
    /// Number of items held by `value`.
    fn len(&self, value: ValueRef<'_>) -> usize;

    /// Visits each item's slot bytes in iteration order.
    fn for_each(
        &self,
        value: ValueRef<'_>,
        visit: &mut dyn FnMut(ValueRef<'_>) -> Result<()>,
    ) -> Result<()>;
}

/// How a proxied collection walks its items during writes.
#[derive(Clone)]
pub enum IterStrategy {
    /// Heap-packed items at the item stride; no adapter involved.
    Contiguous,
    /// Adapter-driven iteration, one call per element.
    Cursor(Arc<dyn CollectionAdapter>),
}

impl std::fmt::Debug for IterStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IterStrategy::Contiguous => write!(f, "Contiguous"),
            IterStrategy::Cursor(_) => write!(f, "Cursor"),
        }
    }
}

/// Cursor adapter over the canonical contiguous layout. Useful as a
/// reference implementation and for exercising the cursor path against
/// collections that are in fact contiguous.
pub struct StridedCursor {
    pub stride: usize,
}

impl CollectionAdapter for StridedCursor {
    fn len(&self, value: ValueRef<'_>) -> usize {
        value::read_handle(value.slot).1
    }

    fn for_each(
        &self,
        value: ValueRef<'_>,
        visit: &mut dyn FnMut(ValueRef<'_>) -> Result<()>,
    ) -> Result<()> {
        let (offset, len) = value::read_handle(value.slot);
        for i in 0..len {
            visit(value.heap_window(offset + i * self.stride, self.stride))?;
        }
        Ok(())
    }
}
