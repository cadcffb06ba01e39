//! Screen validation and confirmation dialogs
//!
//! [`ScreenValidation`] collects every problem that blocks a commit and
//! shows the questions asked before a screen with unsaved changes closes.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::debug;
use trellis_core::{EntityRef, ValidationErrors};

use crate::component::{ComponentKind, FieldBinding, Window};
use crate::messages::{
    ACTION_CANCEL, ACTION_DISCARD, ACTION_SAVE, FIELD_REQUIRED, SAVE_CHANGES_CAPTION,
    SAVE_CHANGES_MESSAGE, UNSAVED_CHANGES_CAPTION, UNSAVED_CHANGES_MESSAGE,
    VALIDATION_FAILED_CAPTION,
};
use crate::screen::CloseAction;
use crate::services::{DialogAction, DialogKind, OptionDialog, ScreenServices, ValidationGroup};

pub const SAVE: &str = "save";
pub const DISCARD: &str = "discard";
pub const CANCEL: &str = "cancel";

#[derive(Debug, Clone)]
pub struct ScreenValidation {
    services: ScreenServices,
}

impl ScreenValidation {
    #[must_use]
    pub fn new(services: ScreenServices) -> Self {
        Self { services }
    }

    /// Validate every visible, enabled and editable field of `window`
    ///
    /// Each field reports at most one problem: a missing required value,
    /// then custom validators, then constraints of its bound property.
    #[must_use]
    pub fn validate_ui_components(&self, window: &Window) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        window.for_each(|component, state| {
            let ComponentKind::Field(field) = component.kind() else {
                return;
            };
            if !state.is_interactive() || !field.is_editable() {
                return;
            }
            if field.is_required() && field.value().is_empty() {
                let message = self
                    .services
                    .messages
                    .format(FIELD_REQUIRED, &[("caption", field.caption())]);
                errors.add_for(component.id().clone(), message);
                return;
            }
            if let Some(message) = field.validator_messages().into_iter().next() {
                errors.add_for(component.id().clone(), message);
                return;
            }
            if let FieldBinding::Bound { container, property } = field.binding() {
                if let Some(entity) = container.item() {
                    let violations = self.services.validator.validate_property(&entity, property);
                    if let Some(violation) = violations.into_iter().next() {
                        errors.add_for(component.id().clone(), violation.message);
                    }
                }
            }
        });
        errors
    }

    /// Re-validate collection properties shown by list components
    ///
    /// Only lists bound to a property of a master entity are checked, and
    /// only when the user can change them: an enabled create/add action, or
    /// items plus an enabled remove/exclude action.
    #[must_use]
    pub fn validate_ui_list_components(&self, window: &Window) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        window.for_each(|component, state| {
            let ComponentKind::List(list) = component.kind() else {
                return;
            };
            let container = list.container();
            let Some((master, property)) = container.master() else {
                return;
            };
            let changeable =
                list.can_add(state) || (!container.is_empty() && list.can_remove(state));
            if !changeable {
                debug!(list = %component.id(), "skipped validation of an unchangeable list");
                return;
            }
            let Some(entity) = master.item() else {
                return;
            };
            for violation in self.services.validator.validate_property(&entity, property) {
                errors.add_for(component.id().clone(), violation.message);
            }
        });
        errors
    }

    /// Whole-entity rules of the cross-field group
    ///
    /// Violations attached to a nested property are dropped; those were
    /// already reported by component validation.
    #[must_use]
    pub fn validate_cross_field_rules(&self, entity: &EntityRef) -> ValidationErrors {
        let mut errors = ValidationErrors::new();
        for violation in self.services.validator.validate(entity, ValidationGroup::UiCrossField) {
            if violation.is_bean_level() {
                errors.add_message(violation.message);
            }
        }
        errors
    }

    /// Notify the user about `errors` and focus the first offending component
    pub fn show_validation_errors(&self, window: &mut Window, errors: &ValidationErrors) {
        if errors.is_empty() {
            return;
        }
        let description = errors.descriptions().collect::<Vec<_>>().join("\n");
        self.services.notifications.show(
            self.services.config.validation.notification_type,
            self.services.messages.get(VALIDATION_FAILED_CAPTION),
            Some(&description),
        );
        if let Some(component) = errors.first_component() {
            if let Err(err) = window.focus(component) {
                debug!(error = %err, "could not focus invalid component");
            }
        }
    }

    /// Ask whether to discard unsaved changes
    #[must_use]
    pub fn show_unsaved_changes_dialog(&self, action: &CloseAction) -> UnsavedChangesDialogResult {
        debug!(action = %action.id(), "asking to discard unsaved changes");
        let outcome = DialogOutcome::new();
        let messages = &self.services.messages;
        self.services.dialogs.show_option_dialog(OptionDialog {
            caption: messages.get(UNSAVED_CHANGES_CAPTION).to_string(),
            message: messages.get(UNSAVED_CHANGES_MESSAGE).to_string(),
            kind: DialogKind::Warning,
            actions: vec![
                outcome.action(DISCARD, messages.get(ACTION_DISCARD)),
                outcome.action(CANCEL, messages.get(ACTION_CANCEL)).primary(),
            ],
        });
        UnsavedChangesDialogResult { outcome }
    }

    /// Ask whether to save unsaved changes, discard them, or stay
    #[must_use]
    pub fn show_save_confirmation_dialog(&self, action: &CloseAction) -> SaveChangesDialogResult {
        debug!(action = %action.id(), "asking to save unsaved changes");
        let outcome = DialogOutcome::new();
        let messages = &self.services.messages;
        self.services.dialogs.show_option_dialog(OptionDialog {
            caption: messages.get(SAVE_CHANGES_CAPTION).to_string(),
            message: messages.get(SAVE_CHANGES_MESSAGE).to_string(),
            kind: DialogKind::Confirmation,
            actions: vec![
                outcome.action(SAVE, messages.get(ACTION_SAVE)).primary(),
                outcome.action(DISCARD, messages.get(ACTION_DISCARD)),
                outcome.action(CANCEL, messages.get(ACTION_CANCEL)),
            ],
        });
        SaveChangesDialogResult { outcome }
    }
}

/// The user's answer to a dialog, delivered to handlers registered by id
///
/// An answer given before its handler is registered is replayed on
/// registration.
#[derive(Default)]
struct DialogOutcome {
    chosen: RefCell<Option<&'static str>>,
    handlers: RefCell<Vec<(&'static str, Box<dyn FnOnce()>)>>,
}

impl DialogOutcome {
    fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    fn action(self: &Rc<Self>, id: &'static str, caption: &str) -> DialogAction {
        let outcome = self.clone();
        DialogAction::new(id, caption, move || outcome.choose(id))
    }

    fn choose(&self, id: &'static str) {
        if self.chosen.borrow().is_some() {
            return;
        }
        *self.chosen.borrow_mut() = Some(id);
        let matching: Vec<Box<dyn FnOnce()>> = {
            let mut handlers = self.handlers.borrow_mut();
            let (matching, _) = std::mem::take(&mut *handlers)
                .into_iter()
                .partition::<Vec<_>, _>(|(handler_id, _)| *handler_id == id);
            matching.into_iter().map(|(_, handler)| handler).collect()
        };
        for handler in matching {
            handler();
        }
    }

    fn on(&self, id: &'static str, handler: impl FnOnce() + 'static) {
        let chosen = *self.chosen.borrow();
        match chosen {
            Some(choice) if choice == id => handler(),
            Some(_) => {}
            None => self.handlers.borrow_mut().push((id, Box::new(handler))),
        }
    }

    fn chosen(&self) -> Option<&'static str> {
        *self.chosen.borrow()
    }
}

impl fmt::Debug for DialogOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialogOutcome")
            .field("chosen", &self.chosen())
            .field("handlers", &self.handlers.borrow().len())
            .finish()
    }
}

/// Answer to the discard/cancel question
#[derive(Debug, Clone)]
pub struct UnsavedChangesDialogResult {
    outcome: Rc<DialogOutcome>,
}

impl UnsavedChangesDialogResult {
    pub fn on_discard(&self, handler: impl FnOnce() + 'static) -> &Self {
        self.outcome.on(DISCARD, handler);
        self
    }

    pub fn on_cancel(&self, handler: impl FnOnce() + 'static) -> &Self {
        self.outcome.on(CANCEL, handler);
        self
    }

    /// Id of the chosen action, once the user answered
    #[must_use]
    pub fn choice(&self) -> Option<&'static str> {
        self.outcome.chosen()
    }
}

/// Answer to the save/discard/cancel question
#[derive(Debug, Clone)]
pub struct SaveChangesDialogResult {
    outcome: Rc<DialogOutcome>,
}

impl SaveChangesDialogResult {
    pub fn on_save(&self, handler: impl FnOnce() + 'static) -> &Self {
        self.outcome.on(SAVE, handler);
        self
    }

    pub fn on_discard(&self, handler: impl FnOnce() + 'static) -> &Self {
        self.outcome.on(DISCARD, handler);
        self
    }

    pub fn on_cancel(&self, handler: impl FnOnce() + 'static) -> &Self {
        self.outcome.on(CANCEL, handler);
        self
    }

    #[must_use]
    pub fn choice(&self) -> Option<&'static str> {
        self.outcome.chosen()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn handlers_run_only_for_the_chosen_action() {
        let outcome = DialogOutcome::new();
        let discarded = Rc::new(Cell::new(0));
        let cancelled = Rc::new(Cell::new(0));
        let (d, c) = (discarded.clone(), cancelled.clone());
        outcome.on(DISCARD, move || d.set(d.get() + 1));
        outcome.on(CANCEL, move || c.set(c.get() + 1));

        outcome.choose(DISCARD);
        outcome.choose(CANCEL);
        assert_eq!(discarded.get(), 1);
        assert_eq!(cancelled.get(), 0);
        assert_eq!(outcome.chosen(), Some(DISCARD));
    }

    #[test]
    fn early_choice_is_replayed_on_registration() {
        let outcome = DialogOutcome::new();
        outcome.action(CANCEL, "Cancel").perform();

        let hit = Rc::new(Cell::new(false));
        let flag = hit.clone();
        outcome.on(DISCARD, || panic!("discard must not run"));
        outcome.on(CANCEL, move || flag.set(true));
        assert!(hit.get());
    }
}
