//! # Refract
//!
//! A fine-grained reactivity library for Rust.
//!
//! Refract lets you construct observable values, derive lazily-recomputed
//! values from them, and register side-effect callbacks that re-run when
//! any observed value they previously read changes:
//!
//! - [`Observable`] - Reactive records with intercepted keyed reads/writes
//! - [`Ref`] - A single-slot observable exposing just `value`
//! - [`Computed`] - Lazily recomputed, cached derived values
//! - [`watch`] - Effects and typed watchers, each returning a disposer
//!
//! ## How tracking works
//!
//! Reading a key while an effect or computed getter is running records the
//! reader as a dependent of that `(target, key)` pair. Writing a key with a
//! genuinely different value first marks every transitively dependent
//! computed dirty, then invokes the subscribed effects synchronously, in
//! registration order, with the previous value. Because invalidation runs
//! before notification, an effect that reads a computed always sees a value
//! recomputed from current upstream state.
//!
//! Everything is synchronous and single-threaded: the graph tables live in
//! a thread-local context, and registrations on one thread are invisible to
//! every other thread.
//!
//! ## Example
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use refract::{computed, create_ref, watch, Value};
//!
//! let count = create_ref(1);
//! let doubled = computed({
//!     let count = count.clone();
//!     move |_prev| Value::from(count.get().as_int().unwrap_or(0) * 2)
//! });
//!
//! let seen = Rc::new(Cell::new(0i64));
//! let sub = watch({
//!     let doubled = doubled.clone();
//!     let seen = Rc::clone(&seen);
//!     move || seen.set(doubled.get().as_int().unwrap_or(0))
//! });
//!
//! assert_eq!(seen.get(), 2);
//! count.set(5);
//! assert_eq!(seen.get(), 10);
//! sub.dispose();
//! ```

pub mod computed;
pub mod observable;
pub mod runtime;
pub mod value;
pub mod watch;

// Re-export main types for convenience
pub use computed::{clear_computed, computed, computed_with_setter, Computed};
pub use observable::{create_ref, reactive, reactive_shallow, Observable, Ref};
pub use runtime::{untracked, Observed, ReactiveRuntime};
pub use value::{is_computed, is_reactive, is_ref, Record, Value};
pub use watch::{
    unwatch, unwatch_key, watch, watch_computed, watch_computed_fn, watch_reactive, watch_ref,
    Subscription,
};
