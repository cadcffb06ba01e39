//! Typed event dispatch
//!
//! An [`EventHub`] dispatches events by their Rust type. Events declared with
//! `TRIGGER_ONCE = true` freeze after their first emission: listeners added
//! afterwards are dropped without ever being called.

use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use tracing::{debug, warn};

/// Marker trait for values published through an [`EventHub`]
pub trait Event: 'static {
    /// Whether the event fires at most once per hub
    const TRIGGER_ONCE: bool = false;
}

type Listener = Rc<RefCell<dyn FnMut(&mut dyn Any)>>;

/// Handle returned by [`EventHub::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    id: u64,
    event: TypeId,
    active: bool,
}

impl Subscription {
    /// Whether the listener was actually registered
    ///
    /// `false` for late subscriptions to trigger-once events that already fired.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }
}

/// Per-owner registry of typed event listeners
#[derive(Default)]
pub struct EventHub {
    listeners: RefCell<HashMap<TypeId, Vec<(u64, Listener)>>>,
    fired: RefCell<HashSet<TypeId>>,
    next_id: Cell<u64>,
}

impl EventHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for events of type `E`
    pub fn subscribe<E: Event>(&self, mut listener: impl FnMut(&mut E) + 'static) -> Subscription {
        let event = TypeId::of::<E>();
        let id = self.next_id.get() + 1;
        self.next_id.set(id);

        if E::TRIGGER_ONCE && self.fired.borrow().contains(&event) {
            debug!(
                event = std::any::type_name::<E>(),
                "dropped late subscription to a trigger-once event"
            );
            return Subscription {
                id,
                event,
                active: false,
            };
        }

        let erased: Listener = Rc::new(RefCell::new(move |any: &mut dyn Any| {
            if let Some(event) = any.downcast_mut::<E>() {
                listener(event);
            }
        }));
        self.listeners
            .borrow_mut()
            .entry(event)
            .or_default()
            .push((id, erased));

        Subscription {
            id,
            event,
            active: true,
        }
    }

    /// Remove a listener; returns whether it was still registered
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let Some(list) = listeners.get_mut(&subscription.event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(id, _)| *id != subscription.id);
        before != list.len()
    }

    /// Dispatch `event` to every listener of its type, in subscription order
    ///
    /// Listeners added while dispatching do not receive the event being
    /// dispatched.
    pub fn publish<E: Event>(&self, event: &mut E) {
        let type_id = TypeId::of::<E>();
        if E::TRIGGER_ONCE && !self.fired.borrow_mut().insert(type_id) {
            debug!(
                event = std::any::type_name::<E>(),
                "trigger-once event already fired"
            );
            return;
        }

        let snapshot: Vec<Listener> = self
            .listeners
            .borrow()
            .get(&type_id)
            .map(|list| list.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default();

        for listener in snapshot {
            match listener.try_borrow_mut() {
                Ok(mut callback) => {
                    let any: &mut dyn Any = &mut *event;
                    (&mut *callback)(any);
                }
                Err(_) => warn!(
                    event = std::any::type_name::<E>(),
                    "skipped re-entrant event listener"
                ),
            }
        }

        if E::TRIGGER_ONCE {
            self.listeners.borrow_mut().remove(&type_id);
        }
    }

    /// Whether any listener is registered for `E`
    #[must_use]
    pub fn has_listeners<E: Event>(&self) -> bool {
        self.listener_count::<E>() > 0
    }

    #[must_use]
    pub fn listener_count<E: Event>(&self) -> usize {
        self.listeners
            .borrow()
            .get(&TypeId::of::<E>())
            .map_or(0, Vec::len)
    }

    /// Whether the trigger-once event `E` has already fired
    #[must_use]
    pub fn has_fired<E: Event>(&self) -> bool {
        self.fired.borrow().contains(&TypeId::of::<E>())
    }
}

impl fmt::Debug for EventHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners: usize = self.listeners.borrow().values().map(Vec::len).sum();
        f.debug_struct("EventHub")
            .field("listeners", &listeners)
            .field("fired", &self.fired.borrow().len())
            .finish()
    }
}
