//! Notification and dialog services that record instead of rendering

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;

use tracing::debug;

use crate::services::{DialogService, NotificationService, NotificationType, OptionDialog};

/// A notification as it was shown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: NotificationType,
    pub caption: String,
    pub description: Option<String>,
}

#[derive(Debug, Default)]
pub struct MemoryNotifications {
    shown: RefCell<Vec<Notification>>,
}

impl MemoryNotifications {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn shown(&self) -> Vec<Notification> {
        self.shown.borrow().clone()
    }

    #[must_use]
    pub fn last(&self) -> Option<Notification> {
        self.shown.borrow().last().cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shown.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shown.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.shown.borrow_mut().clear();
    }
}

impl NotificationService for MemoryNotifications {
    fn show(&self, kind: NotificationType, caption: &str, description: Option<&str>) {
        self.shown.borrow_mut().push(Notification {
            kind,
            caption: caption.to_string(),
            description: description.map(str::to_string),
        });
    }
}

/// Dialog service holding open dialogs until a test answers them
#[derive(Default)]
pub struct MemoryDialogs {
    open: RefCell<VecDeque<OptionDialog>>,
    shown: RefCell<Vec<String>>,
}

impl MemoryDialogs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the oldest open dialog with action `action_id`
    ///
    /// Returns false when no dialog is open or it has no such action. The
    /// dialog is closed either way.
    pub fn choose(&self, action_id: &str) -> bool {
        let dialog = self.open.borrow_mut().pop_front();
        let Some(dialog) = dialog else {
            return false;
        };
        let Some(action) = dialog.actions.into_iter().find(|action| action.id == action_id) else {
            return false;
        };
        debug!(dialog = %dialog.caption, action = action_id, "dialog answered");
        action.perform();
        true
    }

    /// Number of dialogs shown and not yet answered
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.open.borrow().len()
    }

    /// Number of dialogs ever shown
    #[must_use]
    pub fn shown_count(&self) -> usize {
        self.shown.borrow().len()
    }

    #[must_use]
    pub fn last_caption(&self) -> Option<String> {
        self.shown.borrow().last().cloned()
    }

    /// Action ids of the oldest open dialog
    #[must_use]
    pub fn pending_actions(&self) -> Vec<String> {
        self.open
            .borrow()
            .front()
            .map(|dialog| dialog.actions.iter().map(|action| action.id.clone()).collect())
            .unwrap_or_default()
    }
}

impl DialogService for MemoryDialogs {
    fn show_option_dialog(&self, dialog: OptionDialog) {
        self.shown.borrow_mut().push(dialog.caption.clone());
        self.open.borrow_mut().push_back(dialog);
    }
}

impl fmt::Debug for MemoryDialogs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDialogs")
            .field("pending", &self.pending_count())
            .field("shown", &self.shown.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{DialogAction, DialogKind};
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn choosing_performs_the_matching_action() {
        let dialogs = MemoryDialogs::new();
        let hit = Rc::new(Cell::new(false));
        let flag = hit.clone();
        dialogs.show_option_dialog(OptionDialog {
            caption: "Unsaved changes".into(),
            message: "Discard?".into(),
            kind: DialogKind::Warning,
            actions: vec![
                DialogAction::new("discard", "Discard", move || flag.set(true)),
                DialogAction::new("cancel", "Cancel", || {}).primary(),
            ],
        });

        assert_eq!(dialogs.pending_actions(), vec!["discard", "cancel"]);
        assert!(dialogs.choose("discard"));
        assert!(hit.get());
        assert_eq!(dialogs.pending_count(), 0);
        assert_eq!(dialogs.shown_count(), 1);
        assert!(!dialogs.choose("discard"));
    }
}
