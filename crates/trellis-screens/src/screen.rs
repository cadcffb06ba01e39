//! Screen lifecycle
//!
//! A [`Screen`] moves through
//! `Created -> Initialized -> BeforeShown -> Shown -> Closed -> Detached`.
//! Lifecycle events are published through the screen's [`EventHub`]; screen
//! controllers such as [`crate::StandardEditor`] hook into them.
//!
//! A [`ScreenStack`] holds the screens currently attached to the UI. Forced
//! removal from the stack skips `close` entirely and only fires
//! [`AfterDetachEvent`].

use std::any::{Any, TypeId};
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, warn};
use trellis_core::{ComponentId, Event, EventHub, OperationResult, Value};

use crate::component::{ComponentKind, FieldBinding, Window};
use crate::data::ScreenData;
use crate::error::{ScreenError, ScreenResult};

/// Identifier of a screen instance
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScreenId(String);

impl ScreenId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScreenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ScreenId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ScreenId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Created,
    Initialized,
    /// `BeforeShowEvent` is being dispatched
    BeforeShown,
    Shown,
    Closed,
    Detached,
}

/// Fired once when the screen is initialized
#[derive(Debug)]
pub struct InitEvent;

impl Event for InitEvent {
    const TRIGGER_ONCE: bool = true;
}

/// Fired once, right after [`InitEvent`]
#[derive(Debug)]
pub struct AfterInitEvent;

impl Event for AfterInitEvent {
    const TRIGGER_ONCE: bool = true;
}

/// Fired before the screen is attached to the UI
///
/// Listeners may abort showing the screen.
#[derive(Debug)]
pub struct BeforeShowEvent {
    screen: ScreenId,
    error: Option<ScreenError>,
}

impl BeforeShowEvent {
    /// Abort showing the screen; `show` fails with `reason`
    pub fn abort(&mut self, reason: impl Into<String>) {
        let error = ScreenError::ShowAborted {
            screen: self.screen.clone(),
            reason: reason.into(),
        };
        self.fail(error);
    }

    /// Abort showing the screen with `error`
    ///
    /// The first failure wins.
    pub fn fail(&mut self, error: ScreenError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.error.is_some()
    }
}

impl Event for BeforeShowEvent {}

/// Fired when a [`BeforeShowEvent`] listener aborted showing the screen
///
/// Anything acquired while preparing the show must be released here; the
/// screen never reached the UI, so no [`AfterDetachEvent`] follows.
#[derive(Debug)]
pub struct ShowAbortedEvent;

impl Event for ShowAbortedEvent {}

/// Fired after the screen was attached to the UI
#[derive(Debug)]
pub struct AfterShowEvent;

impl Event for AfterShowEvent {}

/// Reason a screen is being closed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseAction {
    /// The user closed the window
    WindowClose,
    /// A generic close request
    Close,
    /// Close after committing changes
    Commit,
    /// Close dropping changes
    Discard,
    /// A lookup returned a selection
    Select,
    Custom {
        id: String,
        check_unsaved_changes: bool,
    },
}

impl CloseAction {
    #[must_use]
    pub fn custom(id: impl Into<String>, check_unsaved_changes: bool) -> Self {
        Self::Custom {
            id: id.into(),
            check_unsaved_changes,
        }
    }

    /// Whether closing for this reason asks about unsaved changes
    #[must_use]
    pub fn checks_unsaved_changes(&self) -> bool {
        match self {
            Self::WindowClose | Self::Close => true,
            Self::Custom {
                check_unsaved_changes, ..
            } => *check_unsaved_changes,
            Self::Commit | Self::Discard | Self::Select => false,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::WindowClose => "window-close",
            Self::Close => "close",
            Self::Commit => "commit",
            Self::Discard => "discard",
            Self::Select => "select",
            Self::Custom { id, .. } => id,
        }
    }
}

/// Fired when closing is requested; listeners may prevent it
#[derive(Debug)]
pub struct BeforeCloseEvent {
    action: CloseAction,
    prevented: bool,
    result: Option<OperationResult>,
}

impl BeforeCloseEvent {
    #[must_use]
    pub fn action(&self) -> &CloseAction {
        &self.action
    }

    /// Keep the screen open; `close` returns a failed result
    pub fn prevent_window_close(&mut self) {
        self.prevented = true;
    }

    /// Keep the screen open; `close` returns `result`
    ///
    /// Used with a pending result that resumes once the user answered a
    /// question.
    pub fn prevent_window_close_with(&mut self, result: OperationResult) {
        self.prevented = true;
        self.result = Some(result);
    }

    #[must_use]
    pub fn is_close_prevented(&self) -> bool {
        self.prevented
    }
}

impl Event for BeforeCloseEvent {}

/// Fired after the screen closed
#[derive(Debug)]
pub struct AfterCloseEvent {
    pub action: CloseAction,
}

impl Event for AfterCloseEvent {}

/// Fired once when the screen leaves the UI, however it leaves
#[derive(Debug)]
pub struct AfterDetachEvent;

impl Event for AfterDetachEvent {}

/// A unit of UI navigation
pub struct Screen {
    id: ScreenId,
    phase: Cell<LifecyclePhase>,
    window: RefCell<Window>,
    caption: RefCell<String>,
    events: EventHub,
    extensions: RefCell<HashMap<TypeId, Rc<dyn Any>>>,
    stack: RefCell<Weak<ScreenStack>>,
}

impl Screen {
    #[must_use]
    pub fn new(id: impl Into<ScreenId>, window: Window) -> Rc<Self> {
        Rc::new(Self {
            id: id.into(),
            phase: Cell::new(LifecyclePhase::Created),
            window: RefCell::new(window),
            caption: RefCell::new(String::new()),
            events: EventHub::new(),
            extensions: RefCell::new(HashMap::new()),
            stack: RefCell::new(Weak::new()),
        })
    }

    #[must_use]
    pub fn id(&self) -> &ScreenId {
        &self.id
    }

    #[must_use]
    pub fn phase(&self) -> LifecyclePhase {
        self.phase.get()
    }

    #[must_use]
    pub fn events(&self) -> &EventHub {
        &self.events
    }

    /// # Panics
    ///
    /// Panics if the window is mutably borrowed.
    #[must_use]
    pub fn window(&self) -> Ref<'_, Window> {
        self.window.borrow()
    }

    /// # Panics
    ///
    /// Panics if the window is already borrowed.
    #[must_use]
    pub fn window_mut(&self) -> RefMut<'_, Window> {
        self.window.borrow_mut()
    }

    #[must_use]
    pub fn caption(&self) -> String {
        self.caption.borrow().clone()
    }

    pub fn set_caption(&self, caption: impl Into<String>) {
        *self.caption.borrow_mut() = caption.into();
    }

    /// Attach a value of type `T`, replacing a previous one
    pub fn set_extension<T: 'static>(&self, value: Rc<T>) {
        self.extensions.borrow_mut().insert(TypeId::of::<T>(), value);
    }

    #[must_use]
    pub fn extension<T: 'static>(&self) -> Option<Rc<T>> {
        let value = self.extensions.borrow().get(&TypeId::of::<T>())?.clone();
        value.downcast::<T>().ok()
    }

    /// The screen's declared data
    ///
    /// # Errors
    ///
    /// Fails when no [`ScreenData`] is attached.
    pub fn screen_data(&self) -> ScreenResult<Rc<ScreenData>> {
        self.extension::<ScreenData>()
            .ok_or_else(|| ScreenError::MissingScreenData(self.id.clone()))
    }

    /// Fire the one-time initialization events
    ///
    /// # Errors
    ///
    /// Fails unless the screen was just created.
    pub fn init(&self) -> ScreenResult<()> {
        self.expect_phase(LifecyclePhase::Created, "init")?;
        self.events.publish(&mut InitEvent);
        self.events.publish(&mut AfterInitEvent);
        self.phase.set(LifecyclePhase::Initialized);
        debug!(screen = %self.id, "screen initialized");
        Ok(())
    }

    /// Whether the screen is currently on a [`ScreenStack`]
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.phase.get() == LifecyclePhase::Shown
    }

    /// Request closing the screen for `action`
    ///
    /// Returns `success` once closed, `fail` if a listener prevented closing,
    /// or the pending result a listener supplied while preventing it.
    /// Closing a screen that is already closed succeeds without effect.
    pub fn close(&self, action: CloseAction) -> OperationResult {
        match self.phase.get() {
            LifecyclePhase::Closed | LifecyclePhase::Detached => {
                debug!(screen = %self.id, action = %action.id(), "screen is already closed");
                return OperationResult::success();
            }
            LifecyclePhase::Shown => {}
            phase => {
                warn!(screen = %self.id, phase = ?phase, "cannot close a screen that is not shown");
                return OperationResult::fail();
            }
        }

        let mut event = BeforeCloseEvent {
            action: action.clone(),
            prevented: false,
            result: None,
        };
        self.events.publish(&mut event);
        if event.prevented {
            debug!(screen = %self.id, action = %action.id(), "close prevented");
            return event.result.unwrap_or_else(OperationResult::fail);
        }
        // a listener may have closed the screen re-entrantly
        if self.phase.get() != LifecyclePhase::Shown {
            return OperationResult::success();
        }

        let stack = self.stack.borrow().upgrade();
        if let Some(stack) = stack {
            stack.take(self);
        }
        self.phase.set(LifecyclePhase::Closed);
        debug!(screen = %self.id, action = %action.id(), "screen closed");
        self.events.publish(&mut AfterCloseEvent { action });
        self.detach();
        OperationResult::success()
    }

    /// Set the value of field `id` as if the user typed it
    ///
    /// Bound fields write through the screen's data context.
    ///
    /// # Errors
    ///
    /// Fails when the component is missing, not a field, not editable, or
    /// bound to an empty container.
    pub fn set_field_value(&self, id: &ComponentId, value: impl Into<Value>) -> ScreenResult<()> {
        let value = value.into();
        let bound = {
            let mut window = self.window.borrow_mut();
            let state = window
                .state(id)
                .ok_or_else(|| ScreenError::ComponentNotFound(id.clone()))?;
            let component = window.component_mut(id)?;
            let ComponentKind::Field(field) = component.kind_mut() else {
                return Err(ScreenError::NotAField(id.clone()));
            };
            if !state.is_interactive() || !field.is_editable() {
                return Err(ScreenError::ReadOnlyField(id.clone()));
            }
            let bound = match field.binding() {
                FieldBinding::Bound { container, property } => {
                    Some((container.clone(), property.clone()))
                }
                FieldBinding::Local(_) => None,
            };
            if bound.is_none() {
                field.set_local_value(value.clone());
            }
            bound
        };

        if let Some((container, property)) = bound {
            let entity = container
                .item()
                .ok_or_else(|| ScreenError::EmptyContainer(id.clone()))?;
            self.screen_data()?.data_context().set_value(&entity, &property, value);
        }
        Ok(())
    }

    /// Current value of field `id`
    ///
    /// # Errors
    ///
    /// Fails when the component is missing or not a field.
    pub fn field_value(&self, id: &ComponentId) -> ScreenResult<Value> {
        Ok(self.window.borrow().field(id)?.value())
    }

    fn expect_phase(&self, expected: LifecyclePhase, operation: &'static str) -> ScreenResult<()> {
        let phase = self.phase.get();
        if phase == expected {
            Ok(())
        } else {
            Err(ScreenError::IllegalState {
                screen: self.id.clone(),
                operation,
                phase,
            })
        }
    }

    fn detach(&self) {
        if self.phase.replace(LifecyclePhase::Detached) == LifecyclePhase::Detached {
            return;
        }
        *self.stack.borrow_mut() = Weak::new();
        debug!(screen = %self.id, "screen detached");
        self.events.publish(&mut AfterDetachEvent);
    }
}

impl fmt::Debug for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Screen")
            .field("id", &self.id)
            .field("phase", &self.phase.get())
            .field("caption", &*self.caption.borrow())
            .finish_non_exhaustive()
    }
}

/// Screens currently attached to the UI, in opening order
#[derive(Debug, Default)]
pub struct ScreenStack {
    screens: RefCell<Vec<Rc<Screen>>>,
}

impl ScreenStack {
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Attach `screen`, initializing it first if needed
    ///
    /// # Errors
    ///
    /// Fails when the screen was already shown, or when a
    /// [`BeforeShowEvent`] listener aborted; an aborted screen stays
    /// initialized and detached.
    pub fn show(self: &Rc<Self>, screen: &Rc<Screen>) -> ScreenResult<()> {
        if screen.phase() == LifecyclePhase::Created {
            screen.init()?;
        }
        screen.expect_phase(LifecyclePhase::Initialized, "show")?;

        screen.phase.set(LifecyclePhase::BeforeShown);
        let mut event = BeforeShowEvent {
            screen: screen.id.clone(),
            error: None,
        };
        screen.events.publish(&mut event);
        if let Some(error) = event.error {
            screen.phase.set(LifecyclePhase::Initialized);
            warn!(screen = %screen.id, error = %error, "show aborted");
            screen.events.publish(&mut ShowAbortedEvent);
            return Err(error);
        }

        *screen.stack.borrow_mut() = Rc::downgrade(self);
        self.screens.borrow_mut().push(screen.clone());
        screen.phase.set(LifecyclePhase::Shown);
        debug!(screen = %screen.id, "screen shown");
        screen.events.publish(&mut AfterShowEvent);
        Ok(())
    }

    /// Forcibly remove `screen` without closing it
    ///
    /// Only [`AfterDetachEvent`] fires. Returns whether the screen was
    /// attached.
    pub fn remove(&self, screen: &Screen) -> bool {
        if !self.take(screen) {
            return false;
        }
        screen.detach();
        true
    }

    /// Forcibly remove every screen, most recent first
    pub fn remove_all(&self) {
        let screens = std::mem::take(&mut *self.screens.borrow_mut());
        for screen in screens.iter().rev() {
            screen.detach();
        }
    }

    #[must_use]
    pub fn contains(&self, screen: &Screen) -> bool {
        self.screens
            .borrow()
            .iter()
            .any(|attached| std::ptr::eq(attached.as_ref(), screen))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.screens.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.screens.borrow().is_empty()
    }

    #[must_use]
    pub fn screens(&self) -> Vec<Rc<Screen>> {
        self.screens.borrow().clone()
    }

    /// Most recently shown screen
    #[must_use]
    pub fn top(&self) -> Option<Rc<Screen>> {
        self.screens.borrow().last().cloned()
    }

    fn take(&self, screen: &Screen) -> bool {
        let mut screens = self.screens.borrow_mut();
        let before = screens.len();
        screens.retain(|attached| !std::ptr::eq(attached.as_ref(), screen));
        before != screens.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn recording_screen(id: &str) -> (Rc<Screen>, Rc<RefCell<Vec<&'static str>>>) {
        let screen = Screen::new(id, Window::empty());
        let log = Rc::new(RefCell::new(Vec::new()));
        macro_rules! record {
            ($event:ty, $tag:expr) => {{
                let log = log.clone();
                screen.events().subscribe(move |_: &mut $event| log.borrow_mut().push($tag));
            }};
        }
        record!(InitEvent, "init");
        record!(AfterInitEvent, "after-init");
        record!(BeforeShowEvent, "before-show");
        record!(ShowAbortedEvent, "show-aborted");
        record!(AfterShowEvent, "after-show");
        record!(BeforeCloseEvent, "before-close");
        record!(AfterCloseEvent, "after-close");
        record!(AfterDetachEvent, "after-detach");
        (screen, log)
    }

    #[test]
    fn full_lifecycle_fires_events_in_order() {
        let stack = ScreenStack::new();
        let (screen, log) = recording_screen("orders");
        stack.show(&screen).unwrap();
        assert!(stack.contains(&screen));
        assert_eq!(screen.phase(), LifecyclePhase::Shown);

        assert!(screen.close(CloseAction::Close).is_success());
        assert!(stack.is_empty());
        assert_eq!(screen.phase(), LifecyclePhase::Detached);
        assert_eq!(
            *log.borrow(),
            vec![
                "init",
                "after-init",
                "before-show",
                "after-show",
                "before-close",
                "after-close",
                "after-detach"
            ]
        );
    }

    #[test]
    fn late_init_listeners_are_never_called() {
        let stack = ScreenStack::new();
        let screen = Screen::new("late", Window::empty());
        stack.show(&screen).unwrap();

        let sub = screen.events().subscribe(|_: &mut InitEvent| panic!("late init listener ran"));
        assert!(!sub.is_active());
        assert!(matches!(screen.init(), Err(ScreenError::IllegalState { .. })));
    }

    #[test]
    fn prevented_close_fails_or_returns_the_supplied_result() {
        let stack = ScreenStack::new();
        let screen = Screen::new("guarded", Window::empty());
        let pending = OperationResult::unknown();
        let supplied = pending.clone();
        screen.events().subscribe(move |event: &mut BeforeCloseEvent| match event.action() {
            CloseAction::Close => event.prevent_window_close(),
            CloseAction::WindowClose => event.prevent_window_close_with(supplied.clone()),
            _ => {}
        });
        stack.show(&screen).unwrap();

        assert!(screen.close(CloseAction::Close).is_fail());
        let result = screen.close(CloseAction::WindowClose);
        assert!(result.is_pending());
        assert!(stack.contains(&screen));

        assert!(screen.close(CloseAction::Discard).is_success());
        assert!(screen.close(CloseAction::Close).is_success());
    }

    #[test]
    fn aborted_show_leaves_screen_detached() {
        let stack = ScreenStack::new();
        let (screen, log) = recording_screen("aborted");
        screen
            .events()
            .subscribe(|event: &mut BeforeShowEvent| event.abort("no permission"));
        let err = stack.show(&screen).unwrap_err();
        assert!(matches!(
            err,
            ScreenError::ShowAborted { ref reason, .. } if reason == "no permission"
        ));
        assert_eq!(screen.phase(), LifecyclePhase::Initialized);
        assert!(stack.is_empty());
        assert!(!stack.remove(&screen));
        assert_eq!(
            *log.borrow(),
            vec!["init", "after-init", "before-show", "show-aborted"]
        );
    }

    #[test]
    fn forced_removal_only_fires_detach() {
        let stack = ScreenStack::new();
        let (first, first_log) = recording_screen("first");
        let (second, second_log) = recording_screen("second");
        stack.show(&first).unwrap();
        stack.show(&second).unwrap();
        assert_eq!(stack.len(), 2);

        assert!(stack.remove(&first));
        assert!(!stack.remove(&first));
        stack.remove_all();
        assert!(stack.is_empty());

        for log in [first_log, second_log] {
            let log = log.borrow();
            assert_eq!(log.last(), Some(&"after-detach"));
            assert!(!log.contains(&"before-close"));
            assert_eq!(log.iter().filter(|tag| **tag == "after-detach").count(), 1);
        }
    }

    #[test]
    fn close_actions_that_check_unsaved_changes() {
        assert!(CloseAction::WindowClose.checks_unsaved_changes());
        assert!(CloseAction::Close.checks_unsaved_changes());
        assert!(!CloseAction::Commit.checks_unsaved_changes());
        assert!(!CloseAction::Discard.checks_unsaved_changes());
        assert!(CloseAction::custom("archive", true).checks_unsaved_changes());
        assert!(!CloseAction::custom("open-report", false).checks_unsaved_changes());
        assert_eq!(CloseAction::custom("archive", true).id(), "archive");
    }

    #[test]
    fn extensions_are_keyed_by_type() {
        let screen = Screen::new("ext", Window::empty());
        assert!(matches!(screen.screen_data(), Err(ScreenError::MissingScreenData(_))));
        screen.set_extension(Rc::new(7_u32));
        assert_eq!(screen.extension::<u32>().as_deref(), Some(&7));
        assert!(screen.extension::<String>().is_none());
    }
}
