//! Lookup screens returning a selection to their caller

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::debug;
use trellis_core::{ComponentId, EntityRef, OperationResult};

use crate::data::CollectionContainer;
use crate::error::ScreenResult;
use crate::screen::{CloseAction, Screen};

/// What a select validator gets to see
#[derive(Debug)]
pub struct SelectValidationContext<'a> {
    pub screen: &'a Screen,
    pub items: &'a [EntityRef],
}

type SelectValidator = Box<dyn Fn(&SelectValidationContext<'_>) -> bool>;
type SelectHandler = Box<dyn FnOnce(Vec<EntityRef>)>;

/// Controller of a screen picking entities from a list
pub struct StandardLookup {
    screen: Rc<Screen>,
    container: Rc<CollectionContainer>,
    validator: RefCell<Option<SelectValidator>>,
    handler: Rc<RefCell<Option<SelectHandler>>>,
}

impl StandardLookup {
    /// Attach a lookup to `screen`, selecting from list component `list_id`
    ///
    /// # Errors
    ///
    /// Fails when the window has no list component with that id.
    pub fn new(screen: &Rc<Screen>, list_id: impl Into<ComponentId>) -> ScreenResult<Rc<Self>> {
        let container = screen.window().list(&list_id.into())?.container().clone();
        Ok(Rc::new(Self {
            screen: screen.clone(),
            container,
            validator: RefCell::new(None),
            handler: Rc::new(RefCell::new(None)),
        }))
    }

    #[must_use]
    pub fn screen(&self) -> &Rc<Screen> {
        &self.screen
    }

    #[must_use]
    pub fn container(&self) -> &Rc<CollectionContainer> {
        &self.container
    }

    /// Predicate that must accept a selection before the lookup closes
    pub fn set_select_validator(
        &self,
        validator: impl Fn(&SelectValidationContext<'_>) -> bool + 'static,
    ) {
        *self.validator.borrow_mut() = Some(Box::new(validator));
    }

    /// Receives the selection once the lookup closed
    pub fn set_select_handler(&self, handler: impl FnOnce(Vec<EntityRef>) + 'static) {
        *self.handler.borrow_mut() = Some(Box::new(handler));
    }

    /// Close with `items` as the selection
    ///
    /// Returns `fail` without closing when the select validator rejects the
    /// items. The select handler runs after the screen closed.
    pub fn select(&self, items: Vec<EntityRef>) -> OperationResult {
        let accepted = self.validator.borrow().as_ref().map_or(true, |validator| {
            validator(&SelectValidationContext {
                screen: &self.screen,
                items: &items,
            })
        });
        if !accepted {
            debug!(screen = %self.screen.id(), items = items.len(), "selection rejected");
            return OperationResult::fail();
        }

        let handler = self.handler.clone();
        self.screen.close(CloseAction::Select).then(move || {
            let handler = handler.borrow_mut().take();
            if let Some(handler) = handler {
                handler(items);
            }
        })
    }

    /// Select the list's current selection; `fail` when nothing is selected
    pub fn select_selected(&self) -> OperationResult {
        match self.container.selected() {
            Some(item) => self.select(vec![item]),
            None => OperationResult::fail(),
        }
    }

    /// Close without a selection
    pub fn cancel(&self) -> OperationResult {
        self.screen.close(CloseAction::Close)
    }
}

impl fmt::Debug for StandardLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StandardLookup")
            .field("screen", &self.screen.id())
            .field("container", &self.container.id())
            .finish_non_exhaustive()
    }
}
