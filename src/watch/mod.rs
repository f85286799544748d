//! Effect registration and typed watchers.
//!
//! Everything here returns a [`Subscription`] disposer; registrations live
//! in the runtime's subscribers table until disposed.

mod watch;

pub use watch::{
    unwatch, unwatch_key, watch, watch_computed, watch_computed_fn, watch_reactive, watch_ref,
    Subscription,
};
