//! Dynamic value model for reactive storage.
//!
//! Observables store loosely-typed values: primitives, plain records, and
//! handles to other reactive nodes. Change detection compares values by
//! identity or primitive equality, never by deep structure.

mod value;

pub use value::{is_computed, is_reactive, is_ref, Record, Value};
