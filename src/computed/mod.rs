//! Lazily recomputed derived values.

mod computed;

pub use computed::{clear_computed, computed, computed_with_setter, Computed};
