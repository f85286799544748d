use std::fmt;

use crate::observable::Observable;
use crate::runtime::{NodeId, Observed, VALUE_KEY};
use crate::value::{Record, Value};

/// A single-slot observable exposing just `value`.
///
/// `create_ref(v)` is `reactive({ value: v })` with the slot name fixed:
/// writes to any key other than `value` are ignored, and all tracking and
/// notification behavior is inherited from [`Observable`].
///
/// # Examples
///
/// ```
/// use refract::create_ref;
///
/// let count = create_ref(1);
/// assert_eq!(count.get(), 1);
///
/// count.set(2);
/// assert_eq!(count.get(), 2);
/// ```
#[derive(Clone)]
pub struct Ref {
    observable: Observable,
}

/// Create a ref wrapping an initial value.
///
/// Use [`Ref::default`] for a ref with no initial value; it reads as
/// [`Value::Nil`] until written.
pub fn create_ref(value: impl Into<Value>) -> Ref {
    Ref::new(value)
}

impl Ref {
    /// Create a ref wrapping an initial value.
    ///
    /// Record-typed values are wrapped into nested observables, exactly as
    /// a deep observable would store them:
    ///
    /// ```
    /// use refract::{create_ref, Record};
    ///
    /// let state = create_ref(Record::from([("count", 1)]));
    /// let inner = state.get();
    /// assert_eq!(inner.as_reactive().unwrap().get("count"), 1);
    /// ```
    pub fn new(value: impl Into<Value>) -> Self {
        let record = Record::new();
        record.insert(VALUE_KEY, value);
        Ref {
            observable: Observable::from_record(record, false, true),
        }
    }

    /// Rebuild a ref handle from an observable tagged as a ref at
    /// construction. Returns `None` for ordinary observables.
    pub fn from_observable(observable: Observable) -> Option<Ref> {
        if observable.is_ref() {
            Some(Ref { observable })
        } else {
            None
        }
    }

    /// Read the value, recording the read in the current tracking frames.
    pub fn get(&self) -> Value {
        self.observable.get(VALUE_KEY)
    }

    /// Read the value without recording the read.
    pub fn get_untracked(&self) -> Value {
        self.observable.get_untracked(VALUE_KEY)
    }

    /// Write the value and run the change cascade.
    pub fn set(&self, value: impl Into<Value>) {
        self.observable.set(VALUE_KEY, value);
    }

    /// The underlying observable.
    pub fn as_observable(&self) -> &Observable {
        &self.observable
    }

    pub(crate) fn into_observable(self) -> Observable {
        self.observable
    }

    /// The ref's node in the dependency graph.
    pub fn id(&self) -> NodeId {
        self.observable.id()
    }
}

impl Default for Ref {
    /// A ref with no initial value; reads as [`Value::Nil`].
    fn default() -> Self {
        Ref::new(Value::Nil)
    }
}

impl Observed for Ref {
    fn node_id(&self) -> NodeId {
        self.observable.id()
    }
}

impl PartialEq for Ref {
    fn eq(&self, other: &Self) -> bool {
        self.observable == other.observable
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref").field("id", &self.id()).finish()
    }
}
