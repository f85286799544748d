//! Runtime support for reactive primitives.
//!
//! This module provides the infrastructure for dependency tracking,
//! reactive graph management, and execution contexts.

mod context;

pub use context::{untracked, NodeId, Observed, ReactiveRuntime};

pub(crate) use context::{EffectEntry, EffectId, VALUE_KEY};
