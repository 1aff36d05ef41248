use std::cell::Cell;

use smol_str::SmolStr;
use tracing::error;

use super::{Deregistration, Evaluable, Scope, ScopeError, Thunk};
use crate::{
    Shared, SharedCell, Value,
    compiler::{Expression, WatchDelegate},
    error::runtime::RuntimeError,
    value::{Array, Object},
};

pub type WatcherId = u64;
pub type ListenerFn = dyn Fn(&Value, &Value, &Scope) -> Result<(), RuntimeError>;
pub type GroupListenerFn = dyn Fn(&[Value], &[Value], &Scope) -> Result<(), RuntimeError>;
type WatchFn = dyn Fn(&Scope) -> Result<Value, RuntimeError>;

struct Watcher {
    id: WatcherId,
    source: SmolStr,
    watch: Box<WatchFn>,
    listener: Box<ListenerFn>,
    value_eq: bool,
    /// `None` until the first digest that sees this watcher.
    last: SharedCell<Option<Value>>,
}

/// A scope's watchers, newest first.
///
/// While a digest walks the list, `cursor` is the index of the watcher being
/// processed. Digests walk from the end, oldest first, so a watcher registered
/// mid-pass is still reached in that pass.
#[derive(Default)]
pub(super) struct Watchers {
    list: Vec<Shared<Watcher>>,
    cursor: Option<usize>,
}

impl Watchers {
    pub(super) fn len(&self) -> usize {
        self.list.len()
    }

    fn push(&mut self, watcher: Shared<Watcher>) {
        self.list.insert(0, watcher);

        if let Some(cursor) = self.cursor.as_mut() {
            *cursor += 1;
        }
    }

    fn remove(&mut self, id: WatcherId) -> bool {
        let Some(index) = self.list.iter().position(|watcher| watcher.id == id) else {
            return false;
        };

        self.list.remove(index);

        if let Some(cursor) = self.cursor.as_mut()
            && index < *cursor
        {
            *cursor -= 1;
        }

        true
    }

    fn next(&mut self) -> Option<Shared<Watcher>> {
        let cursor = self.cursor.as_mut()?;

        if *cursor == 0 {
            return None;
        }

        *cursor -= 1;
        self.list.get(*cursor).cloned()
    }
}

fn are_equal(new: &Value, old: &Value, value_eq: bool) -> bool {
    if value_eq {
        new.deep_equals(old)
    } else {
        new.identical(old)
    }
}

fn all_defined(value: &Value) -> bool {
    match value {
        Value::Array(array) => array.to_vec().iter().all(Value::is_defined),
        Value::Object(object) => object.entries().iter().all(|(_, v)| v.is_defined()),
        other => other.is_defined(),
    }
}

fn thunk_watch(thunk: Thunk) -> Box<WatchFn> {
    Box::new(move |scope| thunk.eval(scope, &Value::Undefined))
}

impl Scope {
    /// Calls `listener(new, old, scope)` whenever the value of `expr` changes
    /// between digest passes. On the first call `old` is the new value.
    ///
    /// With `value_eq` the value is compared structurally and a deep copy is
    /// kept, otherwise by identity. Constant, one-time (`::`) and
    /// input-tracked expressions are watched with specialized delegates.
    pub fn watch(
        &self,
        expr: impl Into<Evaluable>,
        listener: impl Fn(&Value, &Value, &Scope) -> Result<(), RuntimeError> + 'static,
        value_eq: bool,
    ) -> Result<Deregistration, ScopeError> {
        let thunk = self.thunk(expr)?;
        Ok(self.watch_thunk(thunk, Box::new(listener), value_eq))
    }

    fn watch_thunk(
        &self,
        thunk: Thunk,
        listener: Box<ListenerFn>,
        value_eq: bool,
    ) -> Deregistration {
        let delegate = match &thunk {
            Thunk::Expression(expression) => expression.watch_delegate(),
            Thunk::Native(_) => None,
        };

        match (delegate, thunk) {
            (Some(WatchDelegate::Constant), thunk) => {
                self.watch_constant(thunk, listener, value_eq)
            }
            (Some(WatchDelegate::OneTime), thunk) => {
                self.watch_one_time(thunk, listener, value_eq, Value::is_defined)
            }
            (Some(WatchDelegate::OneTimeLiteral), thunk) => {
                self.watch_one_time(thunk, listener, value_eq, all_defined)
            }
            (Some(WatchDelegate::Inputs), Thunk::Expression(expression)) => {
                self.watch_inputs(expression, listener, value_eq)
            }
            (_, thunk) => self.add_watcher(
                thunk.source().into(),
                thunk_watch(thunk),
                listener,
                value_eq,
            ),
        }
    }

    pub fn watcher_count(&self) -> usize {
        self.0
            .watchers
            .borrow()
            .as_ref()
            .map(Watchers::len)
            .unwrap_or_default()
    }

    fn add_watcher(
        &self,
        source: SmolStr,
        watch: Box<WatchFn>,
        listener: Box<ListenerFn>,
        value_eq: bool,
    ) -> Deregistration {
        let state = &self.0.state;
        let id = state.next_id();
        let watcher = Shared::new(Watcher {
            id,
            source,
            watch,
            listener,
            value_eq,
            last: SharedCell::new(None),
        });

        match self.0.watchers.borrow_mut().as_mut() {
            Some(watchers) => watchers.push(watcher),
            None => return Deregistration::new(|| {}),
        }

        state.last_dirty_watch.set(None);

        let scope = Shared::downgrade(&self.0);
        Deregistration::new(move || {
            let Some(scope) = scope.upgrade() else {
                return;
            };
            let removed = scope
                .watchers
                .borrow_mut()
                .as_mut()
                .is_some_and(|watchers| watchers.remove(id));

            if removed {
                scope.state.last_dirty_watch.set(None);
            }
        })
    }

    fn watch_constant(
        &self,
        thunk: Thunk,
        listener: Box<ListenerFn>,
        value_eq: bool,
    ) -> Deregistration {
        let unwatch: Shared<SharedCell<Option<Deregistration>>> = Shared::default();
        let handle = Shared::clone(&unwatch);

        let deregistration = self.add_watcher(
            thunk.source().into(),
            thunk_watch(thunk),
            Box::new(move |new, old, scope| {
                let result = listener(new, old, scope);
                let unwatch = handle.borrow().clone();

                if let Some(unwatch) = unwatch {
                    unwatch.deregister();
                }

                result
            }),
            value_eq,
        );

        *unwatch.borrow_mut() = Some(deregistration.clone());
        deregistration
    }

    /// Keeps watching until `done` holds for the value at the end of a
    /// digest.
    fn watch_one_time(
        &self,
        thunk: Thunk,
        listener: Box<ListenerFn>,
        value_eq: bool,
        done: fn(&Value) -> bool,
    ) -> Deregistration {
        let unwatch: Shared<SharedCell<Option<Deregistration>>> = Shared::default();
        let last: Shared<SharedCell<Value>> = Shared::default();
        let handle = Shared::clone(&unwatch);

        let deregistration = self.add_watcher(
            thunk.source().into(),
            thunk_watch(thunk),
            Box::new(move |new, old, scope| {
                *last.borrow_mut() = new.clone();
                listener(new, old, scope)?;

                if done(new) {
                    let (handle, last) = (Shared::clone(&handle), Shared::clone(&last));
                    scope.post_digest(move || {
                        let finished = done(&last.borrow());
                        let unwatch = handle.borrow().clone();

                        if finished && let Some(unwatch) = unwatch {
                            unwatch.deregister();
                        }
                        Ok(())
                    });
                }

                Ok(())
            }),
            value_eq,
        );

        *unwatch.borrow_mut() = Some(deregistration.clone());
        deregistration
    }

    /// Dirty-checks the expression's inputs and only re-evaluates the whole
    /// expression when one of them changed.
    fn watch_inputs(
        &self,
        expression: Shared<Expression>,
        listener: Box<ListenerFn>,
        value_eq: bool,
    ) -> Deregistration {
        let source = SmolStr::new(expression.source());
        let last_inputs: SharedCell<Option<Vec<Value>>> = SharedCell::new(None);
        let last_result: SharedCell<Value> = SharedCell::default();

        let watch: Box<WatchFn> = Box::new(move |scope| {
            let this = scope.value();
            let undefined = Value::Undefined;
            let inputs = expression
                .inputs()
                .iter()
                .map(|input| input.eval(&this, &undefined))
                .collect::<Result<Vec<_>, _>>()?;

            let changed = match last_inputs.borrow().as_ref() {
                Some(last) => last
                    .iter()
                    .zip(inputs.iter())
                    .any(|(old, new)| !old.identical(new)),
                None => true,
            };

            if changed {
                let result = expression.eval(&this, &undefined)?;
                *last_result.borrow_mut() = result;
                *last_inputs.borrow_mut() = Some(inputs);
            }

            Ok(last_result.borrow().clone())
        });

        self.add_watcher(source, watch, listener, value_eq)
    }

    /// Watches the shallow contents of an array or object: element or
    /// property changes, additions and removals. Other values are compared
    /// by identity.
    ///
    /// The listener receives `(new, old, scope)`. `old` is a shallow copy of
    /// the previous value and is only kept when `track_old` is set;
    /// otherwise it is the value from the first call.
    pub fn watch_collection(
        &self,
        expr: impl Into<Evaluable>,
        listener: impl Fn(&Value, &Value, &Scope) -> Result<(), RuntimeError> + 'static,
        track_old: bool,
    ) -> Result<Deregistration, ScopeError> {
        let thunk = self.thunk(expr)?;
        let source = SmolStr::new(thunk.source());
        let tracker: Shared<SharedCell<CollectionTracker>> = Shared::default();
        let observed = Shared::clone(&tracker);

        let watch: Box<WatchFn> = Box::new(move |scope| {
            let new_value = thunk.eval(scope, &Value::Undefined)?;
            let change_count = observed.borrow_mut().observe(new_value);
            Ok(Value::from(change_count))
        });
        let listener: Box<ListenerFn> = Box::new(move |_, _, scope| {
            let (new_value, old_value) = tracker.borrow_mut().report(track_old);
            listener(&new_value, &old_value, scope)
        });

        Ok(self.add_watcher(source, watch, listener, false))
    }

    /// Watches several expressions with one listener, called at most once
    /// per digest with every current value and every previous value.
    pub fn watch_group<E: Into<Evaluable>>(
        &self,
        exprs: impl IntoIterator<Item = E>,
        listener: impl Fn(&[Value], &[Value], &Scope) -> Result<(), RuntimeError> + 'static,
    ) -> Result<Deregistration, ScopeError> {
        let thunks = exprs
            .into_iter()
            .map(|expr| self.thunk(expr))
            .collect::<Result<Vec<_>, _>>()?;
        let listener: Shared<GroupListenerFn> = Shared::new(listener);

        if thunks.is_empty() {
            let should_call = Shared::new(Cell::new(true));
            let flag = Shared::clone(&should_call);

            self.enqueue_async(Thunk::native(move |scope, _| {
                if flag.get() {
                    listener(&[], &[], scope)?;
                }
                Ok(Value::Undefined)
            }));

            return Ok(Deregistration::new(move || should_call.set(false)));
        }

        let group = Shared::new(SharedCell::new(GroupState::new(thunks.len())));
        let deregistrations = thunks
            .into_iter()
            .enumerate()
            .map(|(index, thunk)| {
                let group = Shared::clone(&group);
                let listener = Shared::clone(&listener);

                self.watch_thunk(
                    thunk,
                    Box::new(move |new, old, scope| {
                        let schedule = group.borrow_mut().record(index, new, old);

                        if schedule {
                            let group = Shared::clone(&group);
                            let listener = Shared::clone(&listener);
                            scope.enqueue_async(Thunk::native(move |scope, _| {
                                let (new_values, old_values) = group.borrow_mut().take();
                                listener(&new_values, &old_values, scope)?;
                                Ok(Value::Undefined)
                            }));
                        }

                        Ok(())
                    }),
                    false,
                )
            })
            .collect::<Vec<_>>();

        Ok(Deregistration::new(move || {
            deregistrations.iter().for_each(Deregistration::deregister)
        }))
    }

    /// One pass over every watcher in the tree. Returns whether any watcher
    /// was dirty.
    pub(super) fn digest_once(&self) -> bool {
        let mut dirty = false;
        self.every_scope(&mut |scope| scope.digest_watchers(&mut dirty));
        dirty
    }

    /// Returns `false` when the pass reached the last dirty watcher again and
    /// the rest of the tree is known to be clean.
    fn digest_watchers(&self, dirty: &mut bool) -> bool {
        let state = &self.0.state;

        match self.0.watchers.borrow_mut().as_mut() {
            Some(watchers) => watchers.cursor = Some(watchers.len()),
            None => return true,
        }

        let mut keep_going = true;

        loop {
            let next = self
                .0
                .watchers
                .borrow_mut()
                .as_mut()
                .and_then(Watchers::next);
            let Some(watcher) = next else {
                break;
            };

            let new = match (watcher.watch)(self) {
                Ok(value) => value,
                Err(err) => {
                    error!(expression = %watcher.source, error = %err, "Watch function failed");
                    continue;
                }
            };
            let old = watcher.last.borrow().clone();
            let changed = old
                .as_ref()
                .is_none_or(|old| !are_equal(&new, old, watcher.value_eq));

            if changed {
                *dirty = true;
                state.last_dirty_watch.set(Some(watcher.id));
                *watcher.last.borrow_mut() = Some(if watcher.value_eq {
                    new.deep_clone()
                } else {
                    new.clone()
                });

                let old = old.unwrap_or_else(|| new.clone());
                if let Err(err) = (watcher.listener)(&new, &old, self) {
                    error!(expression = %watcher.source, error = %err, "Watch listener failed");
                }
            } else if state.last_dirty_watch.get() == Some(watcher.id) {
                keep_going = false;
                break;
            }
        }

        if let Some(watchers) = self.0.watchers.borrow_mut().as_mut() {
            watchers.cursor = None;
        }

        keep_going
    }
}

struct GroupState {
    new_values: Vec<Value>,
    old_values: Vec<Value>,
    scheduled: bool,
    first_run: bool,
}

impl GroupState {
    fn new(len: usize) -> Self {
        Self {
            new_values: vec![Value::Undefined; len],
            old_values: vec![Value::Undefined; len],
            scheduled: false,
            first_run: true,
        }
    }

    /// Returns whether the group listener still needs to be scheduled.
    fn record(&mut self, index: usize, new: &Value, old: &Value) -> bool {
        self.new_values[index] = new.clone();
        self.old_values[index] = old.clone();
        !std::mem::replace(&mut self.scheduled, true)
    }

    fn take(&mut self) -> (Vec<Value>, Vec<Value>) {
        self.scheduled = false;

        if std::mem::take(&mut self.first_run) {
            (self.new_values.clone(), self.new_values.clone())
        } else {
            (self.new_values.clone(), self.old_values.clone())
        }
    }
}

/// Shallow snapshot of a watched collection plus a counter bumped on every
/// detected change. The counter is what the underlying watcher compares.
#[derive(Default)]
struct CollectionTracker {
    new_value: Value,
    old_value: Value,
    old_length: usize,
    very_old: Value,
    change_count: usize,
    reported: bool,
}

impl CollectionTracker {
    fn observe(&mut self, new_value: Value) -> usize {
        match &new_value {
            Value::Array(new) => self.observe_array(new),
            Value::Object(new) => self.observe_object(new),
            other => {
                if !other.identical(&self.old_value) {
                    self.change_count += 1;
                }
                self.old_value = other.clone();
            }
        }

        self.new_value = new_value;
        self.change_count
    }

    fn observe_array(&mut self, new: &Array) {
        let old = match &self.old_value {
            Value::Array(old) => old.clone(),
            _ => {
                self.change_count += 1;
                let old = Array::default();
                self.old_value = Value::Array(old.clone());
                old
            }
        };

        let items = new.to_vec();
        if items.len() != old.len() {
            self.change_count += 1;
            old.set_len(items.len());
        }

        for (index, item) in items.into_iter().enumerate() {
            if !item.identical(&old.get(index)) {
                self.change_count += 1;
                old.set(index, item);
            }
        }
    }

    fn observe_object(&mut self, new: &Object) {
        let old = match &self.old_value {
            Value::Object(old) => old.clone(),
            _ => {
                self.change_count += 1;
                let old = Object::new();
                self.old_value = Value::Object(old.clone());
                self.old_length = 0;
                old
            }
        };

        let entries = new.entries();
        for (key, value) in &entries {
            match old.get_own(key) {
                Some(previous) if previous.identical(value) => {}
                Some(_) => {
                    self.change_count += 1;
                    old.set(key.clone(), value.clone());
                }
                None => {
                    self.change_count += 1;
                    self.old_length += 1;
                    old.set(key.clone(), value.clone());
                }
            }
        }

        if self.old_length > entries.len() {
            self.change_count += 1;
            for key in old.keys() {
                if !new.has_own(&key) {
                    self.old_length -= 1;
                    old.remove(&key);
                }
            }
        }
    }

    /// The values handed to the listener: the current value, and the value
    /// it replaced.
    fn report(&mut self, track_old: bool) -> (Value, Value) {
        let old = if std::mem::replace(&mut self.reported, true) {
            self.very_old.clone()
        } else {
            self.new_value.clone()
        };

        if track_old {
            self.very_old = self.new_value.shallow_clone();
        }

        (self.new_value.clone(), old)
    }
}
