//! Combined browse and edit screens
//!
//! A [`MasterDetailScreen`] shows a browse list next to a form. Selecting a
//! row loads it into the form; editing locks the row, disables the list and
//! makes the form editable until the changes are saved or discarded.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, error, info, warn};
use trellis_core::{key_of, ComponentId, EntityRef, OperationResult, Subscription, ValidationErrors};

use crate::data::{
    CollectionContainer, EntityChangeEvent, EntityLoader, InstanceContainer, ItemChangeEvent,
    PostCommitEvent,
};
use crate::editor::{has_unsaved_changes, resume_with, InitEntityEvent};
use crate::error::{ScreenError, ScreenResult};
use crate::lock::{LockState, LockStatus, PessimisticLockSupport};
use crate::messages::COMMIT_FAILED_CAPTION;
use crate::screen::{AfterDetachEvent, AfterShowEvent, BeforeCloseEvent, CloseAction, Screen};
use crate::services::{NotificationType, ScreenServices};
use crate::validation::ScreenValidation;

/// Component and container ids a master-detail screen is built from
#[derive(Debug, Clone)]
pub struct MasterDetailLayout {
    /// List component showing the browse container
    pub browse_list: ComponentId,
    /// Group holding the detail form
    pub form: ComponentId,
    /// Instance container the form is bound to
    pub edit_container: String,
}

pub struct MasterDetailScreen {
    this: Weak<MasterDetailScreen>,
    screen: Rc<Screen>,
    services: ScreenServices,
    validation: ScreenValidation,
    lock: PessimisticLockSupport,
    layout: MasterDetailLayout,
    browse: Rc<CollectionContainer>,
    edit: Rc<InstanceContainer>,
    loader: Rc<dyn EntityLoader>,
    editing: Cell<bool>,
    creating: Cell<bool>,
    modified_after_edit: Rc<Cell<bool>>,
    context_subscriptions: RefCell<Vec<Subscription>>,
}

impl MasterDetailScreen {
    /// Attach a master-detail controller to `screen`
    ///
    /// # Errors
    ///
    /// Fails when a component, the edit container or its loader is missing.
    pub fn new(
        screen: &Rc<Screen>,
        services: ScreenServices,
        layout: MasterDetailLayout,
    ) -> ScreenResult<Rc<Self>> {
        let browse = {
            let window = screen.window();
            window.component(&layout.form)?;
            window.list(&layout.browse_list)?.container().clone()
        };
        let data = screen.screen_data()?;
        let edit = data
            .instance(&layout.edit_container)
            .ok_or_else(|| ScreenError::MissingContainer {
                screen: screen.id().clone(),
                container: layout.edit_container.clone(),
            })?;
        let loader = data.loader_of(&edit).ok_or_else(|| ScreenError::MissingLoader {
            screen: screen.id().clone(),
            container: layout.edit_container.clone(),
        })?;

        let controller = Rc::new_cyclic(|this| Self {
            this: this.clone(),
            screen: screen.clone(),
            validation: ScreenValidation::new(services.clone()),
            lock: PessimisticLockSupport::new(services.clone()),
            services,
            layout,
            browse,
            edit,
            loader,
            editing: Cell::new(false),
            creating: Cell::new(false),
            modified_after_edit: Rc::new(Cell::new(false)),
            context_subscriptions: RefCell::new(Vec::new()),
        });
        controller.subscribe();
        Ok(controller)
    }

    fn subscribe(&self) {
        let this = self.this.clone();
        self.browse.events().subscribe(move |event: &mut ItemChangeEvent| {
            if let Some(controller) = this.upgrade() {
                controller.on_browse_selection(event.item.clone());
            }
        });

        let events = self.screen.events();
        let this = self.this.clone();
        events.subscribe(move |_: &mut AfterShowEvent| {
            if let Some(controller) = this.upgrade() {
                controller.set_mode(false);
                controller.track_changes();
            }
        });

        let this = self.this.clone();
        events.subscribe(move |event: &mut BeforeCloseEvent| {
            if let Some(controller) = this.upgrade() {
                controller.prevent_unsaved_changes(event);
            }
        });

        let this = self.this.clone();
        events.subscribe(move |_: &mut AfterDetachEvent| {
            if let Some(controller) = this.upgrade() {
                controller.release();
            }
        });
    }

    #[must_use]
    pub fn screen(&self) -> &Rc<Screen> {
        &self.screen
    }

    #[must_use]
    pub fn browse_container(&self) -> &Rc<CollectionContainer> {
        &self.browse
    }

    #[must_use]
    pub fn edit_container(&self) -> &Rc<InstanceContainer> {
        &self.edit
    }

    #[must_use]
    pub fn is_editing(&self) -> bool {
        self.editing.get()
    }

    /// Whether the entity being edited was created in this edit session
    #[must_use]
    pub fn is_creating(&self) -> bool {
        self.creating.get()
    }

    #[must_use]
    pub fn lock_state(&self) -> LockState {
        self.lock.state()
    }

    fn on_browse_selection(&self, item: Option<EntityRef>) {
        if self.editing.get() {
            return;
        }
        match item {
            Some(item) => self.load_detail(&item),
            None => self.edit.set_item(None),
        }
    }

    fn load_detail(&self, item: &EntityRef) {
        let id = item.borrow().id();
        self.loader.set_entity_id(Some(id));
        if let Err(err) = self.loader.load() {
            warn!(screen = %self.screen.id(), error = %err, "cannot load the selected item");
            self.edit.set_item(None);
        }
    }

    fn set_mode(&self, editing: bool) {
        self.editing.set(editing);
        let mut window = self.screen.window_mut();
        let browse = window.set_enabled(&self.layout.browse_list, !editing);
        let form = window.set_read_only(&self.layout.form, !editing);
        if let Err(err) = browse.and(form) {
            warn!(screen = %self.screen.id(), error = %err, "cannot switch edit mode");
        }
    }

    fn begin_edit(&self, creating: bool) {
        self.creating.set(creating);
        self.modified_after_edit.set(false);
        self.set_mode(true);
        debug!(screen = %self.screen.id(), creating, "edit mode entered");
    }

    fn end_edit(&self) {
        self.lock.unlock();
        self.creating.set(false);
        self.set_mode(false);
        debug!(screen = %self.screen.id(), "edit mode left");
    }

    /// Start editing a new entity
    ///
    /// # Errors
    ///
    /// Fails when already editing or the screen declares no data.
    pub fn create(&self) -> ScreenResult<()> {
        if self.editing.get() {
            return Err(ScreenError::AlreadyEditing(self.screen.id().clone()));
        }
        let context = self.screen.screen_data()?.data_context();
        let entity = context.create(self.edit.meta());
        self.screen
            .events()
            .publish(&mut InitEntityEvent { entity: entity.clone() });
        self.edit.set_item(Some(entity));
        self.begin_edit(true);
        Ok(())
    }

    /// Start editing the selected row
    ///
    /// Returns `fail` and stays in browse mode when nothing is selected,
    /// editing is not permitted or another session holds the lock.
    pub fn edit_selected(&self) -> OperationResult {
        if self.editing.get() || self.browse.selected().is_none() {
            return OperationResult::fail();
        }
        let Some(item) = self.edit.item() else {
            return OperationResult::fail();
        };
        let entity_name = item.borrow().entity_name().to_string();
        if !self.services.access.can_edit(&entity_name) {
            info!(screen = %self.screen.id(), entity = %entity_name, "editing is not permitted");
            return OperationResult::fail();
        }
        match self.lock.lock(&item) {
            LockStatus::Failed => OperationResult::fail(),
            LockStatus::Locked | LockStatus::NotSupported => {
                self.begin_edit(false);
                OperationResult::success()
            }
        }
    }

    /// Whether leaving edit mode now would lose edits
    #[must_use]
    pub fn has_unsaved_changes(&self) -> bool {
        if !self.editing.get() {
            return false;
        }
        match self.screen.screen_data() {
            Ok(data) => {
                has_unsaved_changes(data.data_context().as_ref(), self.modified_after_edit.get())
            }
            Err(_) => false,
        }
    }

    fn validate(&self) -> ValidationErrors {
        let mut errors = {
            let window = self.screen.window();
            let mut errors = self.validation.validate_ui_components(&window);
            errors.add_all(self.validation.validate_ui_list_components(&window));
            errors
        };
        if errors.is_empty() && self.services.config.editor.cross_field_validation {
            if let Some(entity) = self.edit.item() {
                errors.add_all(self.validation.validate_cross_field_rules(&entity));
            }
        }
        errors
    }

    /// Validate and commit the form, then return to browse mode
    ///
    /// The saved entity replaces its row in the browse list, or is appended
    /// when it was created, and becomes the selection.
    ///
    /// # Errors
    ///
    /// Fails when not editing or the screen declares no data.
    pub fn save_changes(&self) -> ScreenResult<OperationResult> {
        if !self.editing.get() {
            return Err(ScreenError::NotEditing(self.screen.id().clone()));
        }
        let errors = self.validate();
        if !errors.is_empty() {
            self.validation
                .show_validation_errors(&mut self.screen.window_mut(), &errors);
            return Ok(OperationResult::fail());
        }

        let context = self.screen.screen_data()?.data_context();
        let committed = match context.commit() {
            Ok(committed) => committed,
            Err(err) => {
                error!(screen = %self.screen.id(), error = %err, "commit failed");
                let description = err.to_string();
                self.services.notifications.show(
                    NotificationType::Error,
                    self.services.messages.get(COMMIT_FAILED_CAPTION),
                    Some(&description),
                );
                return Ok(OperationResult::fail());
            }
        };

        if let Some(item) = self.edit.item() {
            let key = key_of(&item);
            let saved = committed
                .iter()
                .find(|entity| key_of(entity) == key)
                .cloned()
                .unwrap_or(item);
            if self.creating.get() || !self.browse.replace_item(saved.clone()) {
                self.browse.insert_item(saved.clone());
            }
            self.browse.set_selected(Some(saved));
            info!(screen = %self.screen.id(), entity = %key, "detail saved");
        }
        self.end_edit();
        Ok(OperationResult::success())
    }

    /// Drop the form's changes and return to browse mode
    ///
    /// # Errors
    ///
    /// Fails when not editing or the screen declares no data.
    pub fn discard_changes(&self) -> ScreenResult<()> {
        if !self.editing.get() {
            return Err(ScreenError::NotEditing(self.screen.id().clone()));
        }
        self.screen.screen_data()?.data_context().evict_modified();
        self.end_edit();
        match self.browse.selected() {
            Some(item) => self.load_detail(&item),
            None => self.edit.set_item(None),
        }
        Ok(())
    }

    fn track_changes(&self) {
        let context = match self.screen.screen_data() {
            Ok(data) => data.data_context(),
            Err(err) => {
                warn!(screen = %self.screen.id(), error = %err, "cannot track changes");
                return;
            }
        };
        let modified = self.modified_after_edit.clone();
        let on_change = context
            .events()
            .subscribe(move |_: &mut EntityChangeEvent| modified.set(true));
        let modified = self.modified_after_edit.clone();
        let on_commit = context
            .events()
            .subscribe(move |_: &mut PostCommitEvent| modified.set(false));
        self.context_subscriptions.borrow_mut().extend([on_change, on_commit]);
    }

    fn prevent_unsaved_changes(&self, event: &mut BeforeCloseEvent) {
        let action = event.action().clone();
        if !action.checks_unsaved_changes() || !self.has_unsaved_changes() {
            return;
        }

        let result = OperationResult::unknown();
        let discard = {
            let result = result.clone();
            let this = self.this.clone();
            move || {
                let outcome = this.upgrade().map(|controller| match controller.discard_changes() {
                    Ok(()) => controller.screen.close(CloseAction::Discard),
                    Err(err) => {
                        warn!(error = %err, "cannot discard changes");
                        OperationResult::fail()
                    }
                });
                resume_with(&result, outcome);
            }
        };
        let cancel = {
            let result = result.clone();
            move || resume_with(&result, None)
        };

        if self.services.config.editor.use_save_confirmation {
            let save = {
                let result = result.clone();
                let this = self.this.clone();
                move || {
                    let outcome = this.upgrade().map(|controller| match controller.save_changes() {
                        Ok(saved) => {
                            let screen = controller.screen.clone();
                            saved.compose(move || screen.close(CloseAction::Commit))
                        }
                        Err(err) => {
                            warn!(error = %err, "cannot save changes");
                            OperationResult::fail()
                        }
                    });
                    resume_with(&result, outcome);
                }
            };
            self.validation
                .show_save_confirmation_dialog(&action)
                .on_save(save)
                .on_discard(discard)
                .on_cancel(cancel);
        } else {
            self.validation
                .show_unsaved_changes_dialog(&action)
                .on_discard(discard)
                .on_cancel(cancel);
        }
        event.prevent_window_close_with(result);
    }

    fn release(&self) {
        self.lock.unlock();
        let subscriptions: Vec<Subscription> =
            self.context_subscriptions.borrow_mut().drain(..).collect();
        if let Ok(data) = self.screen.screen_data() {
            let context = data.data_context();
            for subscription in &subscriptions {
                context.events().unsubscribe(subscription);
            }
        }
    }
}

impl fmt::Debug for MasterDetailScreen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterDetailScreen")
            .field("screen", &self.screen.id())
            .field("layout", &self.layout)
            .field("editing", &self.editing.get())
            .field("lock", &self.lock.state())
            .finish_non_exhaustive()
    }
}
