use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::trace;

use crate::value::Value;

/// Stable identity of an observable or computed node in the reactive graph.
pub type NodeId = usize;

/// Identity of a registered effect callback.
pub(crate) type EffectId = usize;

/// The one key recognized by refs and computeds.
pub(crate) const VALUE_KEY: &str = "value";

type EffectFn = Rc<dyn Fn(Value)>;

/// A subscriber callback plus its identity. The callback argument is the
/// previous value of the key that was written.
#[derive(Clone)]
pub(crate) struct EffectEntry {
    pub(crate) id: EffectId,
    pub(crate) run: EffectFn,
}

/// Anything that owns a node in the reactive graph and can therefore be a
/// subscription target.
pub trait Observed {
    /// The node this handle occupies in the dependency graph.
    fn node_id(&self) -> NodeId;
}

/// Global reactive runtime for managing reactive primitives.
///
/// This handles:
/// - Unique ID allocation for nodes and effects
/// - Dependency tracking (which computed or effect read which key)
/// - Dirty propagation through dependent computeds
/// - Effect notification with the previous value
///
/// The graph tables and the tracking stacks are thread-local: the engine
/// assumes one logical executor, and registrations made on one thread are
/// invisible to every other thread.
pub struct ReactiveRuntime {
    next_id: AtomicUsize,
}

impl ReactiveRuntime {
    /// Get the current reactive runtime.
    pub fn current() -> &'static Self {
        // Use a simple static instance for ID generation
        static RUNTIME: ReactiveRuntime = ReactiveRuntime {
            next_id: AtomicUsize::new(0),
        };
        &RUNTIME
    }

    /// Generate the next unique ID for a reactive primitive or effect.
    pub fn next_id(&self) -> usize {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Record a keyed read against the current tracking frames.
    ///
    /// If an effect is running, it is subscribed to `(target, key)`. If a
    /// computed getter is running, that computed is linked as a dependent of
    /// `(target, key)`. A computed never links to itself.
    pub(crate) fn track_read(&self, target: NodeId, key: &str) {
        CONTEXT.with(|ctx| {
            let mut ctx = ctx.borrow_mut();
            if let Some(effect) = ctx.effect_stack.last().cloned() {
                ctx.subscribe_entry(target, key, effect);
            }
            if let Some(&current) = ctx.computed_stack.last() {
                if current != target {
                    ctx.link(target, key, current);
                }
            }
        });
    }

    /// Append an effect to `(target, key)` directly, deduplicated by id.
    pub(crate) fn subscribe(&self, target: NodeId, key: &str, entry: EffectEntry) {
        CONTEXT.with(|ctx| {
            ctx.borrow_mut().subscribe_entry(target, key, entry);
        });
    }

    /// Mark every computed transitively dependent on `(target, key)` dirty.
    ///
    /// Dependents that are already dirty are not revisited, so diamond
    /// graphs are walked once per node and the walk always terminates.
    pub(crate) fn propagate(&self, target: NodeId, key: &str) {
        CONTEXT.with(|ctx| {
            let mut ctx = ctx.borrow_mut();
            let mut pending = vec![(target, key.to_string())];
            while let Some((node, key)) = pending.pop() {
                let dependents = match ctx.deps.get(&node).and_then(|keys| keys.get(&key)) {
                    Some(list) => list.clone(),
                    None => continue,
                };
                for dependent in dependents {
                    let dirty = ctx.computed_dirty.get(&dependent).copied().unwrap_or(true);
                    if !dirty {
                        trace!(computed = dependent, "marked dirty");
                        ctx.computed_dirty.insert(dependent, true);
                        pending.push((dependent, VALUE_KEY.to_string()));
                    }
                }
            }
        });
    }

    /// Invoke every effect subscribed to `(target, key)` in insertion order,
    /// passing the previous value.
    ///
    /// The list is snapshotted first: effects may register or dispose
    /// subscriptions mid-cascade without corrupting the iteration, and such
    /// changes take hold for subsequent cascades.
    pub(crate) fn notify(&self, target: NodeId, key: &str, old: Value) {
        let entries: Vec<EffectEntry> = CONTEXT.with(|ctx| {
            ctx.borrow()
                .effects
                .get(&target)
                .and_then(|keys| keys.get(key))
                .cloned()
                .unwrap_or_default()
        });
        if entries.is_empty() {
            return;
        }
        trace!(node = target, key, count = entries.len(), "notifying effects");
        for entry in entries {
            (entry.run)(old.clone());
        }
    }

    /// Remove subscriptions below `target`: the whole target when `key` is
    /// absent, otherwise one key entry. Empty entries are pruned.
    pub(crate) fn unsubscribe(&self, target: NodeId, key: Option<&str>) {
        CONTEXT.with(|ctx| {
            let mut ctx = ctx.borrow_mut();
            match key {
                None => {
                    ctx.effects.remove(&target);
                }
                Some(key) => {
                    if let Some(keys) = ctx.effects.get_mut(&target) {
                        keys.remove(key);
                        if keys.is_empty() {
                            ctx.effects.remove(&target);
                        }
                    }
                }
            }
        });
    }

    /// Remove one effect from every `(target, key)` entry in the
    /// subscribers table, pruning entries left empty. Removing an effect
    /// that is no longer present is a no-op.
    pub(crate) fn clear_effect(&self, effect: EffectId) {
        CONTEXT.with(|ctx| {
            let mut ctx = ctx.borrow_mut();
            for keys in ctx.effects.values_mut() {
                for list in keys.values_mut() {
                    list.retain(|entry| entry.id != effect);
                }
                keys.retain(|_, list| !list.is_empty());
            }
            ctx.effects.retain(|_, keys| !keys.is_empty());
        });
    }

    /// Mark a computed dirty. Also registers it on first use; unregistered
    /// ids read as dirty.
    pub(crate) fn mark_computed_dirty(&self, id: NodeId) {
        CONTEXT.with(|ctx| {
            ctx.borrow_mut().computed_dirty.insert(id, true);
        });
    }

    /// Whether a computed must recompute on its next read.
    pub(crate) fn is_computed_dirty(&self, id: NodeId) -> bool {
        CONTEXT.with(|ctx| ctx.borrow().computed_dirty.get(&id).copied().unwrap_or(true))
    }

    /// Mark a computed clean after recomputation.
    pub(crate) fn mark_computed_clean(&self, id: NodeId) {
        CONTEXT.with(|ctx| {
            ctx.borrow_mut().computed_dirty.insert(id, false);
        });
    }

    /// Release a computed from the graph: drop it from every dependents
    /// list, drop its own dependency records, and forget its dirty state.
    pub(crate) fn release_computed(&self, id: NodeId) {
        trace!(computed = id, "released");
        CONTEXT.with(|ctx| {
            let mut ctx = ctx.borrow_mut();
            for keys in ctx.deps.values_mut() {
                for list in keys.values_mut() {
                    list.retain(|&dependent| dependent != id);
                }
                keys.retain(|_, list| !list.is_empty());
            }
            ctx.deps.retain(|_, keys| !keys.is_empty());
            ctx.deps.remove(&id);
            ctx.computed_dirty.remove(&id);
        });
    }

    /// Run `f` with `entry` as the current effect. The frame is popped on
    /// every exit path, including unwinds out of `f`.
    pub(crate) fn with_effect<R>(&self, entry: EffectEntry, f: impl FnOnce() -> R) -> R {
        CONTEXT.with(|ctx| ctx.borrow_mut().effect_stack.push(entry));
        let _frame = EffectFrame;
        f()
    }

    /// Run `f` with `id` as the current computed. The frame is popped on
    /// every exit path, including unwinds out of `f`.
    pub(crate) fn with_computed<R>(&self, id: NodeId, f: impl FnOnce() -> R) -> R {
        CONTEXT.with(|ctx| ctx.borrow_mut().computed_stack.push(id));
        let _frame = ComputedFrame;
        f()
    }

    /// Clear all graph tables and both tracking stacks.
    ///
    /// Intended for test isolation; live handles keep their cached values
    /// but lose every subscription and dependency edge.
    pub fn reset(&self) {
        CONTEXT.with(|ctx| {
            *ctx.borrow_mut() = ReactiveContext::new();
        });
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self, target: NodeId, key: &str) -> usize {
        CONTEXT.with(|ctx| {
            ctx.borrow()
                .effects
                .get(&target)
                .and_then(|keys| keys.get(key))
                .map_or(0, |list| list.len())
        })
    }

    #[cfg(test)]
    pub(crate) fn dependent_count(&self, target: NodeId, key: &str) -> usize {
        CONTEXT.with(|ctx| {
            ctx.borrow()
                .deps
                .get(&target)
                .and_then(|keys| keys.get(key))
                .map_or(0, |list| list.len())
        })
    }
}

/// Run a function without tracking any reads.
///
/// Both tracking stacks are masked while `f` runs, so no subscriptions or
/// dependency links are recorded.
///
/// # Examples
///
/// ```
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use refract::{create_ref, untracked, watch};
///
/// let count = create_ref(0);
/// let runs = Rc::new(Cell::new(0));
///
/// let sub = watch({
///     let count = count.clone();
///     let runs = Rc::clone(&runs);
///     move || {
///         untracked(|| count.get());
///         runs.set(runs.get() + 1);
///     }
/// });
///
/// count.set(1);
/// assert_eq!(runs.get(), 1);
/// sub.dispose();
/// ```
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let saved = CONTEXT.with(|ctx| {
        let mut ctx = ctx.borrow_mut();
        (
            std::mem::take(&mut ctx.effect_stack),
            std::mem::take(&mut ctx.computed_stack),
        )
    });
    let _restore = RestoreStacks(Some(saved));
    f()
}

struct EffectFrame;

impl Drop for EffectFrame {
    fn drop(&mut self) {
        CONTEXT.with(|ctx| {
            ctx.borrow_mut().effect_stack.pop();
        });
    }
}

struct ComputedFrame;

impl Drop for ComputedFrame {
    fn drop(&mut self) {
        CONTEXT.with(|ctx| {
            ctx.borrow_mut().computed_stack.pop();
        });
    }
}

struct RestoreStacks(Option<(Vec<EffectEntry>, Vec<NodeId>)>);

impl Drop for RestoreStacks {
    fn drop(&mut self) {
        if let Some((effects, computeds)) = self.0.take() {
            CONTEXT.with(|ctx| {
                let mut ctx = ctx.borrow_mut();
                ctx.effect_stack = effects;
                ctx.computed_stack = computeds;
            });
        }
    }
}

// Thread-local reactive context for tracking dependencies.
thread_local! {
    static CONTEXT: RefCell<ReactiveContext> = RefCell::new(ReactiveContext::new());
}

struct ReactiveContext {
    // Map from (node, key) to dependent computed IDs, in link order
    deps: HashMap<NodeId, HashMap<String, Vec<NodeId>>>,
    // Map from (node, key) to subscribed effects, in subscription order
    effects: HashMap<NodeId, HashMap<String, Vec<EffectEntry>>>,
    // Stack of effects currently running their registration pass
    effect_stack: Vec<EffectEntry>,
    // Stack of computeds whose getter is currently executing
    computed_stack: Vec<NodeId>,
    // Map from computed ID to dirty state; absent reads as dirty
    computed_dirty: HashMap<NodeId, bool>,
}

impl ReactiveContext {
    fn new() -> Self {
        Self {
            deps: HashMap::new(),
            effects: HashMap::new(),
            effect_stack: Vec::new(),
            computed_stack: Vec::new(),
            computed_dirty: HashMap::new(),
        }
    }

    fn subscribe_entry(&mut self, target: NodeId, key: &str, entry: EffectEntry) {
        let list = self
            .effects
            .entry(target)
            .or_default()
            .entry(key.to_string())
            .or_default();
        if list.iter().all(|existing| existing.id != entry.id) {
            trace!(node = target, key, effect = entry.id, "effect subscribed");
            list.push(entry);
        }
    }

    fn link(&mut self, target: NodeId, key: &str, dependent: NodeId) {
        let list = self
            .deps
            .entry(target)
            .or_default()
            .entry(key.to_string())
            .or_default();
        if !list.contains(&dependent) {
            trace!(node = target, key, computed = dependent, "computed linked");
            list.push(dependent);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn noop_entry(id: EffectId) -> EffectEntry {
        EffectEntry {
            id,
            run: Rc::new(|_| {}),
        }
    }

    #[test]
    fn subscriptions_deduplicate() {
        let runtime = ReactiveRuntime::current();
        runtime.reset();
        let target = runtime.next_id();
        let effect = runtime.next_id();

        runtime.subscribe(target, "count", noop_entry(effect));
        runtime.subscribe(target, "count", noop_entry(effect));
        assert_eq!(runtime.subscriber_count(target, "count"), 1);

        let other = runtime.next_id();
        runtime.subscribe(target, "count", noop_entry(other));
        assert_eq!(runtime.subscriber_count(target, "count"), 2);
    }

    #[test]
    fn notify_passes_previous_value_in_order() {
        let runtime = ReactiveRuntime::current();
        runtime.reset();
        let target = runtime.next_id();
        let log = Rc::new(RefCell::new(Vec::new()));

        for label in ["first", "second"] {
            let log = Rc::clone(&log);
            runtime.subscribe(
                target,
                "count",
                EffectEntry {
                    id: ReactiveRuntime::current().next_id(),
                    run: Rc::new(move |old| log.borrow_mut().push((label, old))),
                },
            );
        }

        runtime.notify(target, "count", Value::Int(7));
        let log = log.borrow();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0], ("first", Value::Int(7)));
        assert_eq!(log[1], ("second", Value::Int(7)));
    }

    #[test]
    fn propagate_marks_transitive_dependents() {
        let runtime = ReactiveRuntime::current();
        runtime.reset();
        let source = runtime.next_id();
        let mid = runtime.next_id();
        let downstream = runtime.next_id();

        runtime.mark_computed_clean(mid);
        runtime.mark_computed_clean(downstream);

        runtime.with_computed(mid, || runtime.track_read(source, "count"));
        runtime.with_computed(downstream, || runtime.track_read(mid, VALUE_KEY));

        runtime.propagate(source, "count");
        assert!(runtime.is_computed_dirty(mid));
        assert!(runtime.is_computed_dirty(downstream));
    }

    #[test]
    fn effect_frame_pops_on_panic() {
        let runtime = ReactiveRuntime::current();
        runtime.reset();
        let target = runtime.next_id();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            runtime.with_effect(noop_entry(runtime.next_id()), || panic!("boom"));
        }));
        assert!(outcome.is_err());

        // No frame left behind: a fresh read must not subscribe anything.
        runtime.track_read(target, "count");
        assert_eq!(runtime.subscriber_count(target, "count"), 0);
    }

    #[test]
    fn untracked_masks_both_stacks() {
        let runtime = ReactiveRuntime::current();
        runtime.reset();
        let target = runtime.next_id();
        let hit = Rc::new(Cell::new(false));

        let hit_inner = Rc::clone(&hit);
        runtime.with_effect(
            EffectEntry {
                id: runtime.next_id(),
                run: Rc::new(move |_| hit_inner.set(true)),
            },
            || untracked(|| runtime.track_read(target, "count")),
        );

        assert_eq!(runtime.subscriber_count(target, "count"), 0);
        assert!(!hit.get());
    }

    #[test]
    fn clear_effect_prunes_empty_entries() {
        let runtime = ReactiveRuntime::current();
        runtime.reset();
        let target = runtime.next_id();
        let effect = runtime.next_id();

        runtime.subscribe(target, "count", noop_entry(effect));
        runtime.clear_effect(effect);
        assert_eq!(runtime.subscriber_count(target, "count"), 0);

        // Second removal is a no-op.
        runtime.clear_effect(effect);
    }

    #[test]
    fn release_computed_unlinks_everywhere() {
        let runtime = ReactiveRuntime::current();
        runtime.reset();
        let source = runtime.next_id();
        let dependent = runtime.next_id();

        runtime.mark_computed_dirty(dependent);
        runtime.with_computed(dependent, || runtime.track_read(source, "count"));
        assert_eq!(runtime.dependent_count(source, "count"), 1);

        runtime.release_computed(dependent);
        assert_eq!(runtime.dependent_count(source, "count"), 0);
    }
}
