//! Reactive records and refs.
//!
//! This module provides the observable containers:
//! - Observables: keyed records whose reads and writes are intercepted
//! - Refs: single-slot observables exposing just `value`

mod observable;
mod reference;

pub use observable::{reactive, reactive_shallow, Observable};
pub use reference::{create_ref, Ref};
