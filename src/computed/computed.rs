use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::runtime::{NodeId, Observed, ReactiveRuntime, VALUE_KEY};
use crate::value::Value;

/// A lazily recomputed, cached derived value.
///
/// A computed starts dirty and evaluates its getter on the first read. The
/// getter's reads are tracked, so any later write to a dependency marks the
/// computed dirty again; the next read recomputes. The dirty flag is the
/// sole recompute authority — a getter that returns [`Value::Nil`] caches
/// `Nil` like any other result.
///
/// The getter receives the previous cached value (`Nil` on the first run),
/// which allows incremental computations.
///
/// # Examples
///
/// Lazy evaluation and caching:
///
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use refract::{computed, create_ref, Value};
///
/// let n = create_ref(2);
/// let runs = Rc::new(Cell::new(0));
///
/// let doubled = computed({
///     let n = n.clone();
///     let runs = Rc::clone(&runs);
///     move |_prev| {
///         runs.set(runs.get() + 1);
///         Value::from(n.get().as_int().unwrap_or(0) * 2)
///     }
/// });
///
/// assert_eq!(runs.get(), 0);
/// assert_eq!(doubled.get(), 4);
/// assert_eq!(doubled.get(), 4);
/// assert_eq!(runs.get(), 1);
///
/// n.set(3);
/// assert_eq!(runs.get(), 1);
/// assert_eq!(doubled.get(), 6);
/// assert_eq!(runs.get(), 2);
/// ```
#[derive(Clone)]
pub struct Computed {
    inner: Rc<ComputedInner>,
}

struct ComputedInner {
    id: NodeId,
    getter: Box<dyn Fn(Value) -> Value>,
    setter: Option<Box<dyn Fn(Value)>>,
    cached: RefCell<Value>,
}

/// Create a read-only computed from a getter.
///
/// The getter receives the previous cached value, [`Value::Nil`] on the
/// first evaluation.
pub fn computed(getter: impl Fn(Value) -> Value + 'static) -> Computed {
    Computed::new(getter)
}

/// Create a read/write computed from a getter and a setter.
///
/// Writing the computed stores the incoming value in the cache, invokes the
/// setter with it, and, if the value actually changed, runs the change
/// cascade for the computed's own subscribers and dependents.
///
/// # Examples
///
/// ```
/// use refract::{computed_with_setter, create_ref, Value};
///
/// let n = create_ref(1);
/// let plus_one = computed_with_setter(
///     {
///         let n = n.clone();
///         move |_prev| Value::from(n.get().as_int().unwrap_or(0) + 1)
///     },
///     {
///         let n = n.clone();
///         move |incoming| n.set(incoming.as_int().unwrap_or(0) - 1)
///     },
/// );
///
/// assert_eq!(plus_one.get(), 2);
/// plus_one.set(0);
/// assert_eq!(n.get(), -1);
/// ```
pub fn computed_with_setter(
    getter: impl Fn(Value) -> Value + 'static,
    setter: impl Fn(Value) + 'static,
) -> Computed {
    Computed::with_setter(getter, setter)
}

impl Computed {
    /// Create a read-only computed. See [`computed`].
    pub fn new(getter: impl Fn(Value) -> Value + 'static) -> Self {
        Self::build(Box::new(getter), None)
    }

    /// Create a read/write computed. See [`computed_with_setter`].
    pub fn with_setter(
        getter: impl Fn(Value) -> Value + 'static,
        setter: impl Fn(Value) + 'static,
    ) -> Self {
        Self::build(Box::new(getter), Some(Box::new(setter)))
    }

    fn build(getter: Box<dyn Fn(Value) -> Value>, setter: Option<Box<dyn Fn(Value)>>) -> Self {
        let runtime = ReactiveRuntime::current();
        let id = runtime.next_id();
        runtime.mark_computed_dirty(id);
        trace!(node = id, "computed created");
        Computed {
            inner: Rc::new(ComputedInner {
                id,
                getter,
                setter,
                cached: RefCell::new(Value::Nil),
            }),
        }
    }

    /// Read the value, recomputing first if a dependency changed.
    ///
    /// The getter runs with this computed on top of the computed stack, so
    /// its reads are recorded as this computed's dependencies; the frame is
    /// popped on every exit path, including a panicking getter (which
    /// leaves the cache untouched and the computed dirty).
    ///
    /// The read itself is then tracked: a running effect subscribes to this
    /// computed, and an enclosing computed getter links itself as a
    /// dependent.
    pub fn get(&self) -> Value {
        let runtime = ReactiveRuntime::current();
        if runtime.is_computed_dirty(self.inner.id) {
            let previous = self.inner.cached.borrow().clone();
            trace!(node = self.inner.id, "recomputing");
            let next = runtime.with_computed(self.inner.id, || (self.inner.getter)(previous));
            *self.inner.cached.borrow_mut() = next;
            runtime.mark_computed_clean(self.inner.id);
        }
        runtime.track_read(self.inner.id, VALUE_KEY);
        self.inner.cached.borrow().clone()
    }

    /// Write the value through the setter.
    ///
    /// Without a configured setter this is a silent no-op: nothing is
    /// stored, so no effect can observe a change. With a setter, the
    /// incoming value is cached, the setter runs (typically writing some
    /// upstream source, which cascades on its own), and then this
    /// computed's dependents are invalidated and its subscribers notified —
    /// but only if the incoming value differs from the cached one.
    pub fn set(&self, value: impl Into<Value>) {
        let setter = match self.inner.setter.as_ref() {
            Some(setter) => setter,
            None => return,
        };
        let value = value.into();
        let old = self.inner.cached.borrow().clone();
        *self.inner.cached.borrow_mut() = value.clone();
        setter(value.clone());
        if old != value {
            let runtime = ReactiveRuntime::current();
            runtime.propagate(self.inner.id, VALUE_KEY);
            runtime.notify(self.inner.id, VALUE_KEY, old);
        }
    }

    /// Whether the next read will recompute.
    pub fn is_dirty(&self) -> bool {
        ReactiveRuntime::current().is_computed_dirty(self.inner.id)
    }

    /// Force invalidation; the next read recomputes. Downstream computeds
    /// are invalidated too, so nothing keeps serving a cache derived from
    /// this one.
    pub fn invalidate(&self) {
        let runtime = ReactiveRuntime::current();
        runtime.mark_computed_dirty(self.inner.id);
        runtime.propagate(self.inner.id, VALUE_KEY);
    }

    /// The computed's node in the dependency graph.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }
}

/// Release a computed from the graph.
///
/// The computed is removed from every dependents list, its own dependency
/// records are dropped, and its cache is cleared. Effects subscribed to the
/// computed stay registered; a later read revives the computed by
/// recomputing from scratch.
pub fn clear_computed(target: &Computed) {
    ReactiveRuntime::current().release_computed(target.inner.id);
    *target.inner.cached.borrow_mut() = Value::Nil;
}

impl Observed for Computed {
    fn node_id(&self) -> NodeId {
        self.inner.id
    }
}

impl PartialEq for Computed {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("cached", &*self.inner.cached.borrow())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observable::{create_ref, reactive};
    use crate::value::Record;
    use std::cell::Cell;

    #[test]
    fn lazy_until_first_read() {
        let state = reactive(Record::from([("foo", Value::Nil)]));
        let runs = Rc::new(Cell::new(0));

        let derived = computed({
            let state = state.clone();
            let runs = Rc::clone(&runs);
            move |_prev| {
                runs.set(runs.get() + 1);
                state.get("foo")
            }
        });

        assert_eq!(runs.get(), 0);
        assert!(derived.get().is_nil());
        assert_eq!(runs.get(), 1);

        // A nil result caches like any other; only the dirty flag decides.
        assert!(derived.get().is_nil());
        assert_eq!(runs.get(), 1);

        state.set("foo", 1);
        assert_eq!(runs.get(), 1);
        assert_eq!(derived.get(), 1);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn chained_computeds_recompute_once_each() {
        let state = reactive(Record::from([("foo", 0)]));

        let first = computed({
            let state = state.clone();
            move |_prev| state.get("foo")
        });
        let second = computed({
            let first = first.clone();
            move |_prev| Value::from(first.get().as_int().unwrap_or(0) + 1)
        });
        let third = computed({
            let first = first.clone();
            let second = second.clone();
            move |_prev| {
                Value::from(second.get().as_int().unwrap_or(0) + first.get().as_int().unwrap_or(0))
            }
        });

        assert_eq!(third.get(), 1);
        assert_eq!(second.get(), 1);
        assert_eq!(first.get(), 0);

        state.set("foo", 1);
        assert_eq!(third.get(), 3);
        assert_eq!(second.get(), 2);
        assert_eq!(first.get(), 1);
    }

    #[test]
    fn getter_receives_previous_value() {
        let count = create_ref(0);
        let seen_prev = Rc::new(RefCell::new(Value::Nil));

        let current = computed({
            let count = count.clone();
            let seen_prev = Rc::clone(&seen_prev);
            move |prev| {
                *seen_prev.borrow_mut() = prev;
                count.get()
            }
        });

        assert_eq!(current.get(), 0);
        assert!(seen_prev.borrow().is_nil());

        count.set(1);
        assert_eq!(current.get(), 1);
        assert_eq!(*seen_prev.borrow(), 0);
    }

    #[test]
    fn write_without_setter_is_ignored() {
        let derived = computed(|_prev| Value::from(1));
        assert_eq!(derived.get(), 1);

        derived.set(99);
        assert_eq!(derived.get(), 1);
    }

    #[test]
    fn setter_round_trip() {
        let n = create_ref(1);
        let plus_one = computed_with_setter(
            {
                let n = n.clone();
                move |_prev| Value::from(n.get().as_int().unwrap_or(0) + 1)
            },
            {
                let n = n.clone();
                move |incoming| n.set(incoming.as_int().unwrap_or(0) - 1)
            },
        );

        plus_one.set(0);
        assert_eq!(n.get(), -1);
        assert_eq!(plus_one.get(), 0);
    }

    #[test]
    fn cleared_computed_recomputes_from_scratch() {
        let count = create_ref(3);
        let runs = Rc::new(Cell::new(0));

        let derived = computed({
            let count = count.clone();
            let runs = Rc::clone(&runs);
            move |_prev| {
                runs.set(runs.get() + 1);
                count.get()
            }
        });

        assert_eq!(derived.get(), 3);
        assert_eq!(runs.get(), 1);

        clear_computed(&derived);
        assert!(derived.is_dirty());
        assert_eq!(derived.get(), 3);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn panicking_getter_stays_dirty() {
        let bomb = Rc::new(Cell::new(true));
        let derived = computed({
            let bomb = Rc::clone(&bomb);
            move |_prev| {
                if bomb.get() {
                    panic!("getter failure");
                }
                Value::from(7)
            }
        });

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| derived.get()));
        assert!(outcome.is_err());
        assert!(derived.is_dirty());

        bomb.set(false);
        assert_eq!(derived.get(), 7);
    }
}
