//! Dirty-checking scopes.
//!
//! A [`Scope`] is a property bag with watchers attached. Scopes form a tree
//! under a root; non-isolated children read through to their parent's
//! properties. `digest` walks the whole tree re-evaluating watchers until
//! nothing changes, and `apply` is the way back in from outside: evaluate
//! something, then digest.
//!
//! All scopes of a tree share one state holding the phase, the async queues
//! and the parser.

mod error;
mod event;
mod watch;

use std::{cell::Cell, collections::VecDeque, fmt};

use tracing::{error, trace, warn};

use crate::{
    Shared, SharedCell, Value,
    compiler::Expression,
    error::runtime::RuntimeError,
    parse::Parser,
    scheduler::{Scheduler, TaskId, TaskQueue},
    value::Object,
};

pub use error::{Phase, ScopeError};
pub use event::{Event, EventListenerFn};
pub use watch::{GroupListenerFn, ListenerFn, WatcherId};

type Weak<T> = std::rc::Weak<T>;

pub type ScopeId = u64;
pub type NativeEval = dyn Fn(&Scope, &Value) -> Result<Value, RuntimeError>;
type PostDigestTask = Box<dyn FnOnce() -> Result<(), RuntimeError>>;

const NATIVE_SOURCE: &str = "<native>";

#[derive(Debug, Clone)]
pub struct ScopeOptions {
    /// Maximum number of dirty passes a single digest may run.
    pub ttl: usize,
}

impl Default for ScopeOptions {
    fn default() -> Self {
        Self { ttl: 10 }
    }
}

/// Something a scope can evaluate: expression text, an already compiled
/// expression, or a host closure receiving the scope and the locals.
#[derive(Clone)]
pub enum Evaluable {
    Text(String),
    Compiled(Shared<Expression>),
    Native(Shared<NativeEval>),
}

impl Evaluable {
    pub fn native(f: impl Fn(&Scope, &Value) -> Result<Value, RuntimeError> + 'static) -> Self {
        Evaluable::Native(Shared::new(f))
    }

    fn into_thunk(self, parser: &Parser) -> Result<Thunk, ScopeError> {
        match self {
            Evaluable::Text(text) => Ok(Thunk::Expression(parser.parse(&text)?)),
            Evaluable::Compiled(expression) => Ok(Thunk::Expression(expression)),
            Evaluable::Native(f) => Ok(Thunk::Native(f)),
        }
    }
}

impl From<&str> for Evaluable {
    fn from(text: &str) -> Self {
        Evaluable::Text(text.to_string())
    }
}

impl From<String> for Evaluable {
    fn from(text: String) -> Self {
        Evaluable::Text(text)
    }
}

impl From<Shared<Expression>> for Evaluable {
    fn from(expression: Shared<Expression>) -> Self {
        Evaluable::Compiled(expression)
    }
}

impl fmt::Debug for Evaluable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Evaluable::Text(text) => write!(f, "Text({text:?})"),
            Evaluable::Compiled(expression) => write!(f, "Compiled({:?})", expression.source()),
            Evaluable::Native(_) => write!(f, "Native"),
        }
    }
}

/// An [`Evaluable`] with its text already compiled.
#[derive(Clone)]
enum Thunk {
    Expression(Shared<Expression>),
    Native(Shared<NativeEval>),
}

impl Thunk {
    fn native(f: impl Fn(&Scope, &Value) -> Result<Value, RuntimeError> + 'static) -> Self {
        Thunk::Native(Shared::new(f))
    }

    fn eval(&self, scope: &Scope, locals: &Value) -> Result<Value, RuntimeError> {
        match self {
            Thunk::Expression(expression) => expression.eval(&scope.value(), locals),
            Thunk::Native(f) => f(scope, locals),
        }
    }

    fn source(&self) -> &str {
        match self {
            Thunk::Expression(expression) => expression.source(),
            Thunk::Native(_) => NATIVE_SOURCE,
        }
    }
}

/// Undoes a registration made with `watch`, `watch_group` or `on`.
///
/// Calling it more than once is harmless.
#[derive(Clone)]
pub struct Deregistration(Shared<dyn Fn()>);

impl Deregistration {
    fn new(f: impl Fn() + 'static) -> Self {
        Self(Shared::new(f))
    }

    pub fn deregister(&self) {
        (self.0)()
    }
}

impl fmt::Debug for Deregistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Deregistration")
    }
}

struct RootState {
    root: Weak<ScopeData>,
    parser: Parser,
    scheduler: Shared<dyn Scheduler>,
    options: ScopeOptions,
    phase: Cell<Option<Phase>>,
    last_dirty_watch: Cell<Option<WatcherId>>,
    apply_async_task: Cell<Option<TaskId>>,
    next_id: Cell<u64>,
    async_queue: SharedCell<VecDeque<(Scope, Thunk)>>,
    apply_async_queue: SharedCell<VecDeque<(Scope, Thunk)>>,
    post_digest_queue: SharedCell<VecDeque<PostDigestTask>>,
}

impl RootState {
    fn next_id(&self) -> u64 {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        id
    }

    fn begin_phase(&self, phase: Phase) -> Result<(), ScopeError> {
        match self.phase.get() {
            Some(current) => Err(ScopeError::PhaseInProgress(current)),
            None => {
                self.phase.set(Some(phase));
                Ok(())
            }
        }
    }
}

struct ScopeData {
    id: ScopeId,
    object: Object,
    isolated: bool,
    state: Shared<RootState>,
    parent: Option<Weak<ScopeData>>,
    children: SharedCell<Vec<Scope>>,
    /// `None` once the scope is destroyed.
    watchers: SharedCell<Option<watch::Watchers>>,
    listeners: SharedCell<event::Listeners>,
}

/// A handle to a scope. Clones refer to the same scope.
#[derive(Clone)]
pub struct Scope(Shared<ScopeData>);

impl Default for Scope {
    fn default() -> Self {
        Self::root()
    }
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        Shared::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Scope {}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.0.id)
            .field("isolated", &self.0.isolated)
            .field("watchers", &self.watcher_count())
            .field("children", &self.0.children.borrow().len())
            .finish()
    }
}

impl Scope {
    /// A root scope with the default parser and its own [`TaskQueue`].
    pub fn root() -> Self {
        Self::with_parser(Parser::default(), TaskQueue::new())
    }

    pub fn with_parser(parser: Parser, scheduler: impl Scheduler + 'static) -> Self {
        Self::with_options(parser, scheduler, ScopeOptions::default())
    }

    pub fn with_options(
        parser: Parser,
        scheduler: impl Scheduler + 'static,
        options: ScopeOptions,
    ) -> Self {
        let scheduler: Shared<dyn Scheduler> = Shared::new(scheduler);

        Self(Shared::new_cyclic(|root| ScopeData {
            id: 1,
            object: Object::new(),
            isolated: false,
            state: Shared::new(RootState {
                root: root.clone(),
                parser,
                scheduler,
                options,
                phase: Cell::new(None),
                last_dirty_watch: Cell::new(None),
                apply_async_task: Cell::new(None),
                next_id: Cell::new(1),
                async_queue: SharedCell::default(),
                apply_async_queue: SharedCell::default(),
                post_digest_queue: SharedCell::default(),
            }),
            parent: None,
            children: SharedCell::default(),
            watchers: SharedCell::new(Some(watch::Watchers::default())),
            listeners: SharedCell::default(),
        }))
    }

    #[inline(always)]
    pub fn id(&self) -> ScopeId {
        self.0.id
    }

    #[inline(always)]
    pub fn is_isolated(&self) -> bool {
        self.0.isolated
    }

    /// The scope's properties. Reads fall through to the parent for
    /// non-isolated scopes.
    pub fn object(&self) -> &Object {
        &self.0.object
    }

    /// The scope as an expression value.
    pub fn value(&self) -> Value {
        Value::Object(self.0.object.clone())
    }

    pub fn get(&self, key: &str) -> Value {
        self.0.object.get(key)
    }

    pub fn set(&self, key: &str, value: impl Into<Value>) {
        self.0.object.set(key, value)
    }

    pub fn parser(&self) -> &Parser {
        &self.0.state.parser
    }

    pub fn phase(&self) -> Option<Phase> {
        self.0.state.phase.get()
    }

    pub fn parent(&self) -> Option<Scope> {
        self.0.parent.as_ref().and_then(Weak::upgrade).map(Scope)
    }

    /// The root of this scope's tree. A scope whose root was dropped is its
    /// own root.
    pub fn root_scope(&self) -> Scope {
        self.0
            .state
            .root
            .upgrade()
            .map(Scope)
            .unwrap_or_else(|| self.clone())
    }

    pub fn children(&self) -> Vec<Scope> {
        self.0.children.borrow().clone()
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.watchers.borrow().is_none()
    }

    pub fn eval(&self, expr: impl Into<Evaluable>) -> Result<Value, ScopeError> {
        self.eval_with(expr, &Value::Undefined)
    }

    /// Evaluates against this scope with `locals` taking precedence over
    /// scope properties.
    pub fn eval_with(&self, expr: impl Into<Evaluable>, locals: &Value) -> Result<Value, ScopeError> {
        let thunk = self.thunk(expr)?;
        Ok(thunk.eval(self, locals)?)
    }

    /// Evaluates `expr` in the `$apply` phase, then digests from the root
    /// whether or not the evaluation failed.
    pub fn apply(&self, expr: impl Into<Evaluable>) -> Result<Value, ScopeError> {
        let state = Shared::clone(&self.0.state);
        state.begin_phase(Phase::Apply)?;

        let result = {
            let _phase = scopeguard::guard(state, |state| state.phase.set(None));
            self.eval(expr)
        };
        let digest = self.root_scope().digest();

        let value = result?;
        digest?;
        Ok(value)
    }

    /// Queues `expr` for the current or next digest. Outside a digest, the
    /// first queued item also schedules one.
    pub fn eval_async(&self, expr: impl Into<Evaluable>) -> Result<(), ScopeError> {
        let thunk = self.thunk(expr)?;
        self.enqueue_async(thunk);
        Ok(())
    }

    fn enqueue_async(&self, thunk: Thunk) {
        let state = &self.0.state;

        if state.phase.get().is_none() && state.async_queue.borrow().is_empty() {
            let root = state.root.clone();
            state.scheduler.schedule(Box::new(move || {
                let Some(root) = root.upgrade().map(Scope) else {
                    return;
                };
                let pending = !root.0.state.async_queue.borrow().is_empty();

                if pending && let Err(err) = root.digest() {
                    error!(error = %err, "Deferred digest failed");
                }
            }));
        }

        state
            .async_queue
            .borrow_mut()
            .push_back((self.clone(), thunk));
    }

    /// Queues `expr` to be evaluated in a later `apply`. Calls made before
    /// that `apply` runs share it.
    pub fn apply_async(&self, expr: impl Into<Evaluable>) -> Result<(), ScopeError> {
        let thunk = self.thunk(expr)?;
        let state = &self.0.state;

        state
            .apply_async_queue
            .borrow_mut()
            .push_back((self.clone(), thunk));

        if state.apply_async_task.get().is_none() {
            let root = state.root.clone();
            let id = state.scheduler.schedule(Box::new(move || {
                let Some(root) = root.upgrade().map(Scope) else {
                    return;
                };
                let flush = Evaluable::native(|scope, _| {
                    scope.flush_apply_async();
                    Ok(Value::Undefined)
                });

                if let Err(err) = root.apply(flush) {
                    error!(error = %err, "Deferred apply failed");
                }
            }));
            state.apply_async_task.set(Some(id));
        }

        Ok(())
    }

    fn flush_apply_async(&self) {
        let state = &self.0.state;

        loop {
            let next = state.apply_async_queue.borrow_mut().pop_front();
            let Some((scope, thunk)) = next else {
                break;
            };

            if let Err(err) = thunk.eval(&scope, &Value::Undefined) {
                error!(expression = thunk.source(), error = %err, "applyAsync task failed");
            }
        }

        state.apply_async_task.set(None);
    }

    /// Runs `task` once after the next digest converges.
    pub fn post_digest(&self, task: impl FnOnce() -> Result<(), RuntimeError> + 'static) {
        self.0
            .state
            .post_digest_queue
            .borrow_mut()
            .push_back(Box::new(task));
    }

    /// Runs watchers across the whole tree until no watcher is dirty and the
    /// async queue is empty, then runs the post-digest tasks.
    pub fn digest(&self) -> Result<(), ScopeError> {
        let root = self.root_scope();
        let state = Shared::clone(&root.0.state);
        state.begin_phase(Phase::Digest)?;

        let phase = scopeguard::guard(Shared::clone(&state), |state| state.phase.set(None));
        state.last_dirty_watch.set(None);
        trace!(scope = root.id(), "Digest started");

        if let Some(id) = state.apply_async_task.take() {
            state.scheduler.cancel(id);
            root.flush_apply_async();
        }

        let ttl = state.options.ttl;
        let mut passes = 0;

        loop {
            root.drain_async_queue();
            let dirty = root.digest_once();
            passes += 1;

            if !dirty && state.async_queue.borrow().is_empty() {
                break;
            }

            if passes >= ttl {
                warn!(ttl, "Digest did not converge");
                return Err(ScopeError::DigestIterationsReached(ttl));
            }
        }

        drop(phase);
        trace!(scope = root.id(), passes, "Digest converged");

        root.drain_post_digest();
        Ok(())
    }

    /// Runs the tasks queued so far. Tasks they enqueue wait for the next
    /// pass, so a task that keeps re-queueing itself is bounded by the TTL.
    fn drain_async_queue(&self) {
        let state = &self.0.state;
        let pending = state.async_queue.borrow().len();

        for _ in 0..pending {
            let next = state.async_queue.borrow_mut().pop_front();
            let Some((scope, thunk)) = next else {
                break;
            };

            if let Err(err) = thunk.eval(&scope, &Value::Undefined) {
                error!(expression = thunk.source(), error = %err, "evalAsync task failed");
            }
        }
    }

    fn drain_post_digest(&self) {
        let state = &self.0.state;

        loop {
            let next = state.post_digest_queue.borrow_mut().pop_front();
            let Some(task) = next else {
                break;
            };

            if let Err(err) = task() {
                error!(error = %err, "postDigest task failed");
            }
        }
    }

    /// Creates a child registered under `parent`, or under `self` when no
    /// parent is given.
    ///
    /// A non-isolated child inherits `self`'s properties. An isolated child
    /// starts empty and only shares the tree state of `parent`.
    pub fn new_child(&self, isolated: bool, parent: Option<&Scope>) -> Scope {
        let parent = parent.unwrap_or(self);
        let (object, state) = if isolated {
            (Object::new(), Shared::clone(&parent.0.state))
        } else {
            (
                Object::with_proto(&self.0.object),
                Shared::clone(&self.0.state),
            )
        };

        let child = Scope(Shared::new(ScopeData {
            id: state.next_id(),
            object,
            isolated,
            state,
            parent: Some(Shared::downgrade(&parent.0)),
            children: SharedCell::default(),
            watchers: SharedCell::new(Some(watch::Watchers::default())),
            listeners: SharedCell::default(),
        }));

        parent.0.children.borrow_mut().push(child.clone());
        child
    }

    /// Broadcasts `$destroy`, detaches the scope from its parent and drops its
    /// watchers and listeners.
    pub fn destroy(&self) {
        if self.is_destroyed() {
            return;
        }

        self.broadcast("$destroy", &[]);

        if let Some(parent) = self.parent() {
            parent.0.children.borrow_mut().retain(|child| child != self);
        }

        *self.0.watchers.borrow_mut() = None;
        self.0.listeners.borrow_mut().clear();
        trace!(scope = self.id(), "Scope destroyed");
    }

    /// Calls `f` on this scope and then its descendants, parent before
    /// children, until `f` returns `false`.
    fn every_scope(&self, f: &mut dyn FnMut(&Scope) -> bool) -> bool {
        if !f(self) {
            return false;
        }

        let children = self.children();
        children.iter().all(|child| child.every_scope(&mut *f))
    }

    fn thunk(&self, expr: impl Into<Evaluable>) -> Result<Thunk, ScopeError> {
        expr.into().into_thunk(&self.0.state.parser)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Function;
    use rstest::rstest;
    use std::rc::Rc;

    fn counter() -> (Rc<Cell<usize>>, impl Fn() + Clone) {
        let count = Rc::new(Cell::new(0));
        let handle = Rc::clone(&count);
        (count, move || handle.set(handle.get() + 1))
    }

    #[rstest]
    #[case::literal("42", Value::from(42.0))]
    #[case::property("a + 1", Value::from(2.0))]
    #[case::missing("b.c", Value::Undefined)]
    fn test_eval(#[case] expr: &str, #[case] expected: Value) {
        let scope = Scope::root();
        scope.set("a", 1.0);

        assert_eq!(scope.eval(expr), Ok(expected));
    }

    #[test]
    fn test_eval_with_locals() {
        let scope = Scope::root();
        scope.set("a", 1.0);
        let locals = Value::from(serde_json::json!({"a": 10}));

        assert_eq!(scope.eval_with("a + 1", &locals), Ok(Value::from(11.0)));
    }

    #[test]
    fn test_eval_native() {
        let scope = Scope::root();
        scope.set("a", 2.0);

        let result = scope.eval(Evaluable::native(|scope, _| {
            Ok(Value::from(scope.get("a").to_number() * 3.0))
        }));

        assert_eq!(result, Ok(Value::from(6.0)));
    }

    #[test]
    fn test_eval_parse_error() {
        let scope = Scope::root();
        assert!(matches!(scope.eval("a +"), Err(ScopeError::Expression(_))));
    }

    #[test]
    fn test_apply_digests() {
        let scope = Scope::root();
        let (count, bump) = counter();
        scope.set("a", "x");
        scope
            .watch("a", move |_, _, _| Ok(bump()), false)
            .unwrap();

        scope.apply("a = 'y'").unwrap();

        assert_eq!(scope.get("a"), Value::from("y"));
        assert_eq!(count.get(), 1);
        assert_eq!(scope.phase(), None);
    }

    #[test]
    fn test_apply_digests_after_failure() {
        let scope = Scope::root();
        let (count, bump) = counter();
        scope.set(
            "fail",
            Function::new("fail", |_, _| Err(RuntimeError::user_defined("boom"))),
        );
        scope
            .watch("a", move |_, _, _| Ok(bump()), false)
            .unwrap();

        let result = scope.apply("fail()");

        assert_eq!(
            result,
            Err(ScopeError::Runtime(RuntimeError::user_defined("boom")))
        );
        assert_eq!(count.get(), 1);
        assert_eq!(scope.phase(), None);
    }

    #[test]
    fn test_phase_in_progress() {
        let scope = Scope::root();
        let inner = Rc::new(SharedCell::new(None));
        let result = Rc::clone(&inner);

        scope
            .apply(Evaluable::native(move |scope, _| {
                *result.borrow_mut() = Some(scope.apply("1"));
                Ok(Value::Undefined)
            }))
            .unwrap();

        assert_eq!(
            inner.borrow_mut().take(),
            Some(Err(ScopeError::PhaseInProgress(Phase::Apply)))
        );
    }

    #[test]
    fn test_digest_from_listener_fails() {
        let scope = Scope::root();
        let inner = Rc::new(SharedCell::new(None));
        let result = Rc::clone(&inner);

        scope
            .watch(
                "a",
                move |_, _, scope| {
                    *result.borrow_mut() = Some(scope.digest());
                    Ok(())
                },
                false,
            )
            .unwrap();
        scope.digest().unwrap();

        assert_eq!(
            inner.borrow_mut().take(),
            Some(Err(ScopeError::PhaseInProgress(Phase::Digest)))
        );
    }

    #[test]
    fn test_eval_async_runs_in_digest() {
        let scope = Scope::root();
        scope.set("a", 1.0);

        scope
            .watch(
                "a",
                |_, _, scope| {
                    scope.eval_async("b = a * 2").map_err(|e| RuntimeError::user_defined(e.to_string()))?;
                    Ok(())
                },
                false,
            )
            .unwrap();
        scope.digest().unwrap();

        assert_eq!(scope.get("b"), Value::from(2.0));
    }

    #[test]
    fn test_eval_async_schedules_digest() {
        let queue = TaskQueue::new();
        let scope = Scope::with_parser(Parser::default(), queue.clone());
        let (count, bump) = counter();
        scope
            .watch("a", move |_, _, _| Ok(bump()), false)
            .unwrap();

        scope.eval_async("a = 1").unwrap();
        scope.eval_async("a = 2").unwrap();

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.run_pending(), 1);
        assert_eq!(scope.get("a"), Value::from(2.0));
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_eval_async_scheduled_digest_skips_drained_queue() {
        let queue = TaskQueue::new();
        let scope = Scope::with_parser(Parser::default(), queue.clone());
        let (count, bump) = counter();
        scope
            .watch("a", move |_, _, _| Ok(bump()), false)
            .unwrap();

        scope.eval_async("a = 1").unwrap();
        scope.digest().unwrap();
        queue.run_pending();

        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_eval_async_errors_do_not_abort_digest() {
        let scope = Scope::root();
        scope.set(
            "fail",
            Function::new("fail", |_, _| Err(RuntimeError::user_defined("boom"))),
        );

        scope.eval_async("fail()").unwrap();
        scope.eval_async("done = true").unwrap();
        scope.digest().unwrap();

        assert_eq!(scope.get("done"), Value::from(true));
    }

    #[test]
    fn test_apply_async_coalesces() {
        let queue = TaskQueue::new();
        let scope = Scope::with_parser(Parser::default(), queue.clone());
        let (count, bump) = counter();
        scope
            .watch("a", move |_, _, _| Ok(bump()), false)
            .unwrap();
        scope.digest().unwrap();

        scope.apply_async("a = 1").unwrap();
        scope.apply_async("a = 2").unwrap();

        assert_eq!(scope.get("a"), Value::Undefined);
        assert_eq!(queue.len(), 1);

        queue.run_pending();

        assert_eq!(scope.get("a"), Value::from(2.0));
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn test_digest_flushes_apply_async() {
        let queue = TaskQueue::new();
        let scope = Scope::with_parser(Parser::default(), queue.clone());

        scope.apply_async("a = 1").unwrap();
        scope.digest().unwrap();

        assert_eq!(scope.get("a"), Value::from(1.0));
        assert!(queue.is_empty());

        scope.apply_async("a = 2").unwrap();
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_post_digest() {
        let scope = Scope::root();
        let (count, bump) = counter();

        scope.post_digest(move || {
            bump();
            Ok(())
        });
        scope.post_digest(|| Err(RuntimeError::user_defined("ignored")));

        scope.digest().unwrap();
        scope.digest().unwrap();

        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_post_digest_runs_outside_phase() {
        let scope = Scope::root();
        let phase = Rc::new(Cell::new(Some(Phase::Apply)));
        let seen = Rc::clone(&phase);
        let handle = scope.clone();

        scope.post_digest(move || {
            seen.set(handle.phase());
            Ok(())
        });
        scope.digest().unwrap();

        assert_eq!(phase.get(), None);
    }

    #[rstest]
    #[case::default_ttl(ScopeOptions::default(), 10)]
    #[case::custom_ttl(ScopeOptions { ttl: 3 }, 3)]
    fn test_digest_iterations_reached(#[case] options: ScopeOptions, #[case] ttl: usize) {
        let scope = Scope::with_options(Parser::default(), TaskQueue::new(), options);
        scope.set("a", 0.0);
        scope.set("b", 0.0);

        scope
            .watch("a", |_, _, scope| Ok(scope.set("b", scope.get("b").to_number() + 1.0)), false)
            .unwrap();
        scope
            .watch("b", |_, _, scope| Ok(scope.set("a", scope.get("a").to_number() + 1.0)), false)
            .unwrap();

        assert_eq!(
            scope.digest(),
            Err(ScopeError::DigestIterationsReached(ttl))
        );
        assert_eq!(scope.phase(), None);
    }

    #[test]
    fn test_digest_recovers_after_iterations_reached() {
        let scope = Scope::root();
        scope.set("a", 0.0);
        scope.set("b", 0.0);
        let (count, bump) = counter();

        scope
            .watch(
                "a",
                move |_, _, scope| {
                    bump();
                    Ok(scope.set("b", scope.get("b").to_number() + 1.0))
                },
                false,
            )
            .unwrap();
        let feedback = scope
            .watch("b", |_, _, scope| Ok(scope.set("a", scope.get("a").to_number() + 1.0)), false)
            .unwrap();

        assert_eq!(
            scope.digest(),
            Err(ScopeError::DigestIterationsReached(10))
        );

        feedback.deregister();
        scope.digest().unwrap();
        let settled = count.get();

        scope.eval_async("a = 100").unwrap();
        scope.digest().unwrap();

        assert_eq!(count.get(), settled + 1);
        assert_eq!(scope.get("a"), Value::from(100.0));
        assert_eq!(scope.phase(), None);
    }

    fn requeue(scope: &Scope) -> Result<Value, RuntimeError> {
        scope.set("runs", scope.get("runs").to_number() + 1.0);
        scope
            .eval_async(Evaluable::native(|scope, _| requeue(scope)))
            .map_err(|e| RuntimeError::user_defined(e.to_string()))?;
        Ok(Value::Undefined)
    }

    #[test]
    fn test_digest_iterations_reached_by_requeueing_task() {
        let scope = Scope::with_options(Parser::default(), TaskQueue::new(), ScopeOptions { ttl: 4 });
        scope.set("runs", 0.0);

        scope.eval_async(Evaluable::native(|scope, _| requeue(scope))).unwrap();

        assert_eq!(
            scope.digest(),
            Err(ScopeError::DigestIterationsReached(4))
        );
        assert_eq!(scope.get("runs"), Value::from(4.0));
        assert_eq!(scope.phase(), None);
    }

    #[test]
    fn test_digest_iterations_reached_by_watcher_queueing_tasks() {
        let scope = Scope::root();

        scope
            .watch(
                Evaluable::native(|scope, _| {
                    scope
                        .eval_async("n = n + 1")
                        .map_err(|e| RuntimeError::user_defined(e.to_string()))?;
                    Ok(Value::Undefined)
                }),
                |_, _, _| Ok(()),
                false,
            )
            .unwrap();

        assert_eq!(
            scope.digest(),
            Err(ScopeError::DigestIterationsReached(10))
        );
        assert_eq!(scope.phase(), None);
    }

    #[test]
    fn test_new_child_inherits() {
        let parent = Scope::root();
        parent.set("a", 1.0);
        let child = parent.new_child(false, None);

        assert_eq!(child.get("a"), Value::from(1.0));

        child.set("a", 2.0);
        assert_eq!(parent.get("a"), Value::from(1.0));
        assert_eq!(child.eval("a"), Ok(Value::from(2.0)));
        assert_eq!(child.parent(), Some(parent.clone()));
        assert_eq!(parent.children(), vec![child]);
    }

    #[test]
    fn test_new_child_isolated() {
        let parent = Scope::root();
        parent.set("a", 1.0);
        let child = parent.new_child(true, None);

        assert!(child.is_isolated());
        assert_eq!(child.get("a"), Value::Undefined);
        assert_eq!(child.root_scope(), parent);
    }

    #[test]
    fn test_isolated_child_shares_async_queue() {
        let root = Scope::root();
        root.set("a", 1.0);
        let child = root.new_child(true, None);

        child.set("a", 2.0);
        child.eval_async("b = a").unwrap();
        root.digest().unwrap();

        assert_eq!(root.get("a"), Value::from(1.0));
        assert_eq!(child.get("b"), Value::from(2.0));
        assert_eq!(root.get("b"), Value::Undefined);
    }

    #[test]
    fn test_new_child_with_other_parent() {
        let root = Scope::root();
        let prototype = root.new_child(false, None);
        let other = root.new_child(false, None);
        prototype.set("a", 1.0);

        let child = prototype.new_child(false, Some(&other));

        assert_eq!(child.get("a"), Value::from(1.0));
        assert_eq!(child.parent(), Some(other.clone()));
        assert_eq!(other.children(), vec![child]);
        assert!(prototype.children().is_empty());
    }

    #[test]
    fn test_digest_from_child_runs_whole_tree() {
        let root = Scope::root();
        let child = root.new_child(false, None);
        let (count, bump) = counter();
        root.watch("a", move |_, _, _| Ok(bump()), false).unwrap();

        child.digest().unwrap();

        assert_eq!(count.get(), 1);
    }

    #[test]
    fn test_destroy() {
        let root = Scope::root();
        let child = root.new_child(false, None);
        let (count, bump) = counter();
        child.set("a", 1.0);
        child.watch("a", move |_, _, _| Ok(bump()), false).unwrap();
        root.digest().unwrap();

        child.destroy();
        child.set("a", 2.0);
        root.digest().unwrap();

        assert_eq!(count.get(), 1);
        assert!(child.is_destroyed());
        assert!(root.children().is_empty());
        assert_eq!(child.watcher_count(), 0);
    }

    #[test]
    fn test_destroy_root() {
        let root = Scope::root();
        root.destroy();
        root.destroy();

        assert!(root.is_destroyed());
        assert!(root.digest().is_ok());
    }
}
