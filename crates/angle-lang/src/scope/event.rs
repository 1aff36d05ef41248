use std::cell::Cell;

use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use tracing::error;

use super::{Deregistration, Scope};
use crate::{Shared, SharedCell, Value, error::runtime::RuntimeError};

pub type EventListenerFn = dyn Fn(&Event, &[Value]) -> Result<(), RuntimeError>;

type ListenerId = u64;

/// Listeners by event name. Deregistered listeners leave a `None` behind so
/// that a dispatch in progress does not skip anyone; dispatch compacts them.
pub(super) type Listeners = FxHashMap<SmolStr, Vec<Option<(ListenerId, Shared<EventListenerFn>)>>>;

/// An event travelling through the scope tree.
pub struct Event {
    name: SmolStr,
    target_scope: Scope,
    current_scope: SharedCell<Option<Scope>>,
    stoppable: bool,
    propagation_stopped: Cell<bool>,
    default_prevented: Cell<bool>,
}

impl Event {
    fn new(name: &str, target_scope: Scope, stoppable: bool) -> Self {
        Self {
            name: SmolStr::new(name),
            target_scope,
            current_scope: SharedCell::new(None),
            stoppable,
            propagation_stopped: Cell::new(false),
            default_prevented: Cell::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The scope the event was emitted or broadcast on.
    pub fn target_scope(&self) -> &Scope {
        &self.target_scope
    }

    /// The scope whose listeners are running. `None` once dispatch is over.
    pub fn current_scope(&self) -> Option<Scope> {
        self.current_scope.borrow().clone()
    }

    /// Stops an emitted event from reaching further parents. Broadcasts
    /// cannot be stopped.
    pub fn stop_propagation(&self) {
        if self.stoppable {
            self.propagation_stopped.set(true);
        }
    }

    pub fn is_propagation_stopped(&self) -> bool {
        self.propagation_stopped.get()
    }

    pub fn prevent_default(&self) {
        self.default_prevented.set(true);
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented.get()
    }

    fn set_current_scope(&self, scope: Option<Scope>) {
        *self.current_scope.borrow_mut() = scope;
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("name", &self.name)
            .field("target_scope", &self.target_scope.id())
            .field("default_prevented", &self.default_prevented.get())
            .finish()
    }
}

impl Scope {
    /// Listens for `name` on this scope.
    pub fn on(
        &self,
        name: &str,
        listener: impl Fn(&Event, &[Value]) -> Result<(), RuntimeError> + 'static,
    ) -> Deregistration {
        let id = self.0.state.next_id();
        let name = SmolStr::new(name);
        let listener: Shared<EventListenerFn> = Shared::new(listener);

        self.0
            .listeners
            .borrow_mut()
            .entry(name.clone())
            .or_default()
            .push(Some((id, listener)));

        let scope = Shared::downgrade(&self.0);
        Deregistration::new(move || {
            let Some(scope) = scope.upgrade() else {
                return;
            };

            if let Some(slots) = scope.listeners.borrow_mut().get_mut(&name) {
                slots
                    .iter_mut()
                    .filter(|slot| slot.as_ref().is_some_and(|(slot_id, _)| *slot_id == id))
                    .for_each(|slot| *slot = None);
            }
        })
    }

    /// Dispatches `name` on this scope and then on each parent, until a
    /// listener stops propagation.
    pub fn emit(&self, name: &str, args: &[Value]) -> Event {
        let event = Event::new(name, self.clone(), true);
        let mut scope = Some(self.clone());

        while let Some(current) = scope {
            event.set_current_scope(Some(current.clone()));
            current.fire(&event, args);

            if event.is_propagation_stopped() {
                break;
            }

            scope = current.parent();
        }

        event.set_current_scope(None);
        event
    }

    /// Dispatches `name` on this scope and every descendant, parents before
    /// children.
    pub fn broadcast(&self, name: &str, args: &[Value]) -> Event {
        let event = Event::new(name, self.clone(), false);

        self.every_scope(&mut |scope| {
            event.set_current_scope(Some(scope.clone()));
            scope.fire(&event, args);
            true
        });

        event.set_current_scope(None);
        event
    }

    fn fire(&self, event: &Event, args: &[Value]) {
        let mut index = 0;

        loop {
            let next = {
                let mut listeners = self.0.listeners.borrow_mut();
                let Some(slots) = listeners.get_mut(event.name()) else {
                    break;
                };

                loop {
                    match slots.get(index) {
                        Some(Some((_, listener))) => break Some(Shared::clone(listener)),
                        Some(None) => {}
                        None => break None,
                    }
                    slots.remove(index);
                }
            };

            let Some(listener) = next else {
                break;
            };

            if let Err(err) = listener(event, args) {
                error!(event = %event.name, error = %err, "Event listener failed");
            }

            index += 1;
        }
    }
}
