use std::cell::RefCell;
use std::rc::Rc;

use tracing::trace;

use crate::computed::{computed, Computed};
use crate::observable::{Observable, Ref};
use crate::runtime::{EffectEntry, EffectId, Observed, ReactiveRuntime, VALUE_KEY};
use crate::value::Value;

/// Disposer for a watch registration.
///
/// `dispose()` removes every effect the registration created from the
/// subscribers table and prunes emptied entries. Disposing twice is a
/// no-op. Dropping a `Subscription` without disposing leaves the
/// registration alive: effects are bound to the graph by the table entries,
/// not by this handle.
///
/// Disposing during an active cascade is allowed; the running cascade
/// iterates a snapshot, so the removal takes hold for subsequent cascades.
#[must_use = "dropping a Subscription does not dispose it; keep it to call dispose()"]
#[derive(Clone, Debug)]
pub struct Subscription {
    effects: Vec<EffectId>,
}

impl Subscription {
    fn single(effect: EffectId) -> Self {
        Subscription {
            effects: vec![effect],
        }
    }

    /// Remove this registration from the subscribers table.
    pub fn dispose(&self) {
        let runtime = ReactiveRuntime::current();
        for &effect in &self.effects {
            trace!(effect, "subscription disposed");
            runtime.clear_effect(effect);
        }
    }
}

/// Register an effect and run it once.
///
/// The initial run executes with the effect as the current tracking frame:
/// every observable key and computed value it reads subscribes it to that
/// `(target, key)` pair. Later writes to any of those pairs re-invoke the
/// effect synchronously. Re-invocations run outside any tracking frame, so
/// the dependency set is the one recorded on the initial run.
///
/// # Examples
///
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use refract::{create_ref, watch};
///
/// let count = create_ref(1);
/// let seen = Rc::new(Cell::new(0i64));
///
/// let sub = watch({
///     let count = count.clone();
///     let seen = Rc::clone(&seen);
///     move || seen.set(count.get().as_int().unwrap_or(0))
/// });
///
/// assert_eq!(seen.get(), 1);
///
/// count.set(2);
/// assert_eq!(seen.get(), 2);
///
/// sub.dispose();
/// count.set(3);
/// assert_eq!(seen.get(), 2);
/// ```
pub fn watch(effect: impl Fn() + 'static) -> Subscription {
    let runtime = ReactiveRuntime::current();
    let id = runtime.next_id();
    let run: Rc<dyn Fn(Value)> = Rc::new(move |_old| effect());
    let entry = EffectEntry {
        id,
        run: Rc::clone(&run),
    };
    trace!(effect = id, "watch registered");
    runtime.with_effect(entry, || run(Value::Nil));
    Subscription::single(id)
}

/// Watch a ref; the callback receives `(new, old)` on every change.
///
/// # Examples
///
/// ```
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use refract::{create_ref, watch_ref, Value};
///
/// let count = create_ref(1);
/// let log = Rc::new(RefCell::new(Vec::new()));
///
/// let sub = watch_ref(&count, {
///     let log = Rc::clone(&log);
///     move |new, old| log.borrow_mut().push((new, old))
/// });
///
/// count.set(2);
/// assert_eq!(log.borrow().as_slice(), &[(Value::Int(2), Value::Int(1))]);
/// sub.dispose();
/// ```
pub fn watch_ref(target: &Ref, callback: impl Fn(Value, Value) + 'static) -> Subscription {
    let runtime = ReactiveRuntime::current();
    let id = runtime.next_id();
    let source = target.clone();
    let run: Rc<dyn Fn(Value)> = Rc::new(move |old| {
        let new = source.get_untracked();
        callback(new, old);
    });
    runtime.subscribe(target.node_id(), VALUE_KEY, EffectEntry { id, run });
    Subscription::single(id)
}

/// Watch a computed; the callback receives `(new, old)` whenever the
/// computed's value actually changes.
///
/// Registration performs one tracked evaluation, so the watcher reacts both
/// to setter writes on the computed and to upstream writes that invalidate
/// it. The previous value is remembered by the watcher itself; callbacks
/// fire only when the recomputed value differs from the last one seen.
///
/// # Examples
///
/// ```
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use refract::{computed, create_ref, watch_computed, Value};
///
/// let n = create_ref(1);
/// let doubled = computed({
///     let n = n.clone();
///     move |_prev| Value::from(n.get().as_int().unwrap_or(0) * 2)
/// });
///
/// let log = Rc::new(RefCell::new(Vec::new()));
/// let sub = watch_computed(&doubled, {
///     let log = Rc::clone(&log);
///     move |new, old| log.borrow_mut().push((new, old))
/// });
///
/// n.set(3);
/// assert_eq!(log.borrow().as_slice(), &[(Value::Int(6), Value::Int(2))]);
/// sub.dispose();
/// ```
pub fn watch_computed(
    target: &Computed,
    callback: impl Fn(Value, Value) + 'static,
) -> Subscription {
    let runtime = ReactiveRuntime::current();
    let id = runtime.next_id();
    let source = target.clone();
    let seen = Rc::new(RefCell::new(Value::Nil));

    let run: Rc<dyn Fn(Value)> = {
        let source = source.clone();
        let seen = Rc::clone(&seen);
        Rc::new(move |_old| {
            let new = source.get();
            let old = seen.replace(new.clone());
            if old != new {
                callback(new, old);
            }
        })
    };
    let entry = EffectEntry { id, run };

    // The registration pass re-evaluates the getter inside the watcher's
    // effect frame, subscribing it to the computed and to every leaf the
    // getter reads.
    runtime.with_effect(entry, || {
        source.invalidate();
        let current = source.get();
        *seen.borrow_mut() = current;
    });
    Subscription::single(id)
}

/// Watch a getter: wraps it in a [`computed`] first, then behaves exactly
/// like [`watch_computed`]. The wrapping computed lives as long as the
/// registration.
pub fn watch_computed_fn(
    getter: impl Fn(Value) -> Value + 'static,
    callback: impl Fn(Value, Value) + 'static,
) -> Subscription {
    let target = computed(getter);
    watch_computed(&target, callback)
}

/// Watch every key of an observable, recursing into nested observables.
///
/// The callback receives `(key, new, old)`. The walk happens once, at
/// registration: keys added later and records assigned later are not
/// watched. The returned disposer removes every wrapper the walk created.
///
/// # Examples
///
/// ```
/// use std::cell::RefCell;
/// use std::rc::Rc;
/// use refract::{reactive, watch_reactive, Record, Value};
///
/// let state = reactive(Record::from([
///     ("count", Value::from(0)),
///     ("name", Value::from("boot")),
/// ]));
/// let log = Rc::new(RefCell::new(Vec::new()));
///
/// let sub = watch_reactive(&state, {
///     let log = Rc::clone(&log);
///     move |key, new, old| log.borrow_mut().push((key.to_string(), new, old))
/// });
///
/// state.set("count", 1);
/// assert_eq!(
///     log.borrow().as_slice(),
///     &[("count".to_string(), Value::Int(1), Value::Int(0))]
/// );
/// sub.dispose();
/// ```
pub fn watch_reactive(
    target: &Observable,
    callback: impl Fn(&str, Value, Value) + 'static,
) -> Subscription {
    let runtime = ReactiveRuntime::current();
    let callback: Rc<dyn Fn(&str, Value, Value)> = Rc::new(callback);
    let mut effects = Vec::new();
    register_keys(runtime, target, &callback, &mut effects);
    Subscription { effects }
}

fn register_keys(
    runtime: &'static ReactiveRuntime,
    target: &Observable,
    callback: &Rc<dyn Fn(&str, Value, Value)>,
    effects: &mut Vec<EffectId>,
) {
    for (key, value) in target.entries() {
        let id = runtime.next_id();
        let source = target.clone();
        let reported = key.clone();
        let cb = Rc::clone(callback);
        let run: Rc<dyn Fn(Value)> = Rc::new(move |old| {
            let new = source.get_untracked(&reported);
            cb(&reported, new, old);
        });
        runtime.subscribe(target.node_id(), &key, EffectEntry { id, run });
        effects.push(id);

        if let Value::Reactive(nested) = value {
            register_keys(runtime, &nested, callback, effects);
        }
    }
}

/// Drop every subscription on a target.
pub fn unwatch(target: &impl Observed) {
    ReactiveRuntime::current().unsubscribe(target.node_id(), None);
}

/// Drop every subscription on one key of a target.
pub fn unwatch_key(target: &impl Observed, key: &str) {
    ReactiveRuntime::current().unsubscribe(target.node_id(), Some(key));
}
