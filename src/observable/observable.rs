use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::runtime::{NodeId, Observed, ReactiveRuntime, VALUE_KEY};
use crate::value::{Record, Value};

/// A reactive record that intercepts keyed reads and writes.
///
/// Reading a key while an effect or a computed getter is running records the
/// reader as a dependent of that `(observable, key)` pair. Writing a key
/// with a genuinely different value first marks every transitively dependent
/// computed dirty, then invokes the subscribed effects in registration
/// order.
///
/// Observables are cheap-to-clone handles over shared storage. The handle,
/// never the underlying storage, is the identity in the dependency graph.
///
/// # Examples
///
/// Basic usage:
///
/// ```
/// use refract::{reactive, Record};
///
/// let state = reactive(Record::from([("count", 0)]));
/// assert_eq!(state.get("count"), 0);
///
/// state.set("count", 42);
/// assert_eq!(state.get("count"), 42);
/// ```
///
/// Nested records are wrapped recursively:
///
/// ```
/// use refract::{is_reactive, reactive, Record};
///
/// let profile = Record::from([("name", "Ada")]);
/// let state = reactive(Record::from([("profile", profile)]));
///
/// let nested = state.get("profile");
/// assert!(is_reactive(&nested));
/// assert_eq!(nested.as_reactive().unwrap().get("name"), "Ada");
/// ```
#[derive(Clone)]
pub struct Observable {
    inner: Rc<ObsInner>,
}

struct ObsInner {
    id: NodeId,
    store: RefCell<BTreeMap<String, Value>>,
    shallow: bool,
    is_ref: bool,
}

/// Create a deep observable from a plain record.
///
/// Every record-typed entry is recursively wrapped into an observable at
/// construction time; records written later are wrapped at write time.
/// Values that are already observables pass through unchanged.
pub fn reactive(record: Record) -> Observable {
    Observable::from_record(record, false, false)
}

/// Create a shallow observable: only top-level keys are instrumented, and
/// record-typed values are stored as plain records.
pub fn reactive_shallow(record: Record) -> Observable {
    Observable::from_record(record, true, false)
}

impl Observable {
    pub(crate) fn from_record(record: Record, shallow: bool, is_ref: bool) -> Self {
        let runtime = ReactiveRuntime::current();
        let id = runtime.next_id();
        let mut store = BTreeMap::new();
        for (key, value) in record.entries() {
            let value = if shallow { value } else { Self::adopt(value) };
            store.insert(key, value);
        }
        trace!(node = id, shallow, is_ref, "observable created");
        Observable {
            inner: Rc::new(ObsInner {
                id,
                store: RefCell::new(store),
                shallow,
                is_ref,
            }),
        }
    }

    // Convert a plain record into an observable; everything else passes
    // through, so re-wrapping an observable is the identity.
    fn adopt(value: Value) -> Value {
        match value {
            Value::Record(record) => Value::Reactive(reactive(record)),
            other => other,
        }
    }

    /// Read a key, recording the read in the current tracking frames.
    ///
    /// Missing keys read as [`Value::Nil`].
    pub fn get(&self, key: &str) -> Value {
        ReactiveRuntime::current().track_read(self.inner.id, key);
        self.get_untracked(key)
    }

    /// Read a key without recording the read.
    pub fn get_untracked(&self, key: &str) -> Value {
        self.inner
            .store
            .borrow()
            .get(key)
            .cloned()
            .unwrap_or(Value::Nil)
    }

    /// Write a key and run the change cascade.
    ///
    /// Writing a value equal (by identity or primitive equality) to the
    /// current one is a no-op. Otherwise the new value is stored, every
    /// transitively dependent computed is marked dirty, and then every
    /// effect subscribed to this key is invoked with the previous value.
    ///
    /// On a deep observable, a plain record is wrapped into an observable
    /// before storage. On a ref, keys other than `value` are ignored.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        if self.inner.is_ref && key != VALUE_KEY {
            return;
        }
        let mut value = value.into();
        if !self.inner.shallow {
            value = Self::adopt(value);
        }
        let old = {
            let mut store = self.inner.store.borrow_mut();
            let old = store.get(key).cloned().unwrap_or(Value::Nil);
            if old == value {
                return;
            }
            store.insert(key.to_string(), value);
            old
        };
        trace!(node = self.inner.id, key, "value changed");
        let runtime = ReactiveRuntime::current();
        runtime.propagate(self.inner.id, key);
        runtime.notify(self.inner.id, key, old);
    }

    /// Snapshot of the stored keys, without tracking.
    pub fn keys(&self) -> Vec<String> {
        self.inner.store.borrow().keys().cloned().collect()
    }

    /// Snapshot of the stored entries in key order, without tracking.
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.inner
            .store
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// The observable's node in the dependency graph.
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    /// Whether this observable was created as a ref.
    pub fn is_ref(&self) -> bool {
        self.inner.is_ref
    }

    /// Whether this observable stores nested records un-instrumented.
    pub fn is_shallow(&self) -> bool {
        self.inner.shallow
    }
}

impl Observed for Observable {
    fn node_id(&self) -> NodeId {
        self.inner.id
    }
}

impl PartialEq for Observable {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl fmt::Debug for Observable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("id", &self.inner.id)
            .field("keys", &self.inner.store.borrow().len())
            .field("shallow", &self.inner.shallow)
            .field("is_ref", &self.inner.is_ref)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watch::watch;
    use std::cell::Cell;

    #[test]
    fn missing_keys_read_as_nil() {
        let state = reactive(Record::new());
        assert!(state.get("anything").is_nil());
    }

    #[test]
    fn equal_write_is_a_no_op() {
        let state = reactive(Record::from([("count", 1)]));
        let runs = Rc::new(Cell::new(0));

        let sub = watch({
            let state = state.clone();
            let runs = Rc::clone(&runs);
            move || {
                let _ = state.get("count");
                runs.set(runs.get() + 1);
            }
        });

        assert_eq!(runs.get(), 1);
        state.set("count", 1);
        assert_eq!(runs.get(), 1);
        state.set("count", 2);
        assert_eq!(runs.get(), 2);
        sub.dispose();
    }

    #[test]
    fn effects_receive_previous_value() {
        let state = reactive(Record::from([("count", 1)]));
        let seen = Rc::new(Cell::new(0i64));

        let sub = crate::watch::watch_reactive(&state, {
            let seen = Rc::clone(&seen);
            move |_key, _new, old| seen.set(old.as_int().unwrap_or(-1))
        });

        state.set("count", 5);
        assert_eq!(seen.get(), 1);
        sub.dispose();
    }

    #[test]
    fn deep_write_wraps_records() {
        let state = reactive(Record::new());
        state.set("nested", Record::from([("inner", 1)]));

        let nested = state.get("nested");
        let nested = nested.as_reactive().expect("deep write wraps records");
        assert_eq!(nested.get("inner"), 1);
    }

    #[test]
    fn shallow_stores_records_unwrapped() {
        let state = reactive_shallow(Record::from([("nested", Record::from([("inner", 1)]))]));
        let nested = state.get("nested");
        assert!(nested.as_record().is_some());

        state.set("other", Record::new());
        assert!(state.get("other").as_record().is_some());
    }

    #[test]
    fn rewrapping_an_observable_is_identity() {
        let child = reactive(Record::from([("inner", 1)]));
        let state = reactive(Record::new());
        state.set("child", child.clone());

        let stored = state.get("child");
        assert_eq!(stored.as_reactive().unwrap().id(), child.id());
    }

    #[test]
    fn replacing_a_record_value_notifies() {
        let state = reactive_shallow(Record::from([("data", Record::new())]));
        let runs = Rc::new(Cell::new(0));

        let sub = watch({
            let state = state.clone();
            let runs = Rc::clone(&runs);
            move || {
                let _ = state.get("data");
                runs.set(runs.get() + 1);
            }
        });

        // A different record handle is a different identity.
        state.set("data", Record::new());
        assert_eq!(runs.get(), 2);
        sub.dispose();
    }
}
