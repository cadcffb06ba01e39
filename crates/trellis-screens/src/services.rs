//! Collaborator interfaces consumed by the screen lifecycle
//!
//! Screens never reach for ambient framework state. Every outside service is
//! handed in through a [`ScreenServices`] bundle when a screen controller is
//! constructed.

use std::fmt;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use trellis_core::EntityRef;

use crate::config::ScreensConfig;
use crate::messages::MessageCatalog;

/// Presentation style of a notification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationType {
    #[default]
    Tray,
    Humanized,
    Warning,
    Error,
    System,
}

/// A lock held on some resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockInfo {
    pub resource: String,
    pub key: String,
    /// Login of the session holding the lock
    pub holder: String,
    /// When the lock was acquired
    pub since: DateTime<Utc>,
}

/// Answer of a [`LockManager`] to a lock request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockResponse {
    /// The calling session now holds the lock
    Acquired,
    /// Another session holds the lock
    Held(LockInfo),
    /// Locking is not configured for the resource
    NotSupported,
}

/// Pessimistic lock manager shared between sessions
pub trait LockManager {
    fn lock(&self, resource: &str, key: &str) -> LockResponse;

    fn unlock(&self, resource: &str, key: &str);
}

pub trait NotificationService {
    fn show(&self, kind: NotificationType, caption: &str, description: Option<&str>);
}

/// Tone of an option dialog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogKind {
    Confirmation,
    Warning,
}

/// A dialog button
pub struct DialogAction {
    pub id: String,
    pub caption: String,
    /// Default button
    pub primary: bool,
    handler: Box<dyn FnOnce()>,
}

impl DialogAction {
    pub fn new(
        id: impl Into<String>,
        caption: impl Into<String>,
        handler: impl FnOnce() + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            caption: caption.into(),
            primary: false,
            handler: Box::new(handler),
        }
    }

    /// Mark the action as the default button
    #[must_use]
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    /// Invoke the button's handler
    pub fn perform(self) {
        (self.handler)();
    }
}

impl fmt::Debug for DialogAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialogAction")
            .field("id", &self.id)
            .field("caption", &self.caption)
            .field("primary", &self.primary)
            .finish_non_exhaustive()
    }
}

/// Modal question with a fixed set of answers
#[derive(Debug)]
pub struct OptionDialog {
    pub caption: String,
    pub message: String,
    pub kind: DialogKind,
    pub actions: Vec<DialogAction>,
}

/// Shows option dialogs
///
/// The call returns immediately. The host later performs exactly one of the
/// dialog's actions, when the user picks it.
pub trait DialogService {
    fn show_option_dialog(&self, dialog: OptionDialog);
}

/// Validation group a bean constraint belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationGroup {
    Default,
    /// Whole-entity rules checked by editors before commit
    UiCrossField,
}

/// One failed constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintViolation {
    /// Property path from the validated entity; empty for the entity itself
    pub path: Vec<String>,
    pub message: String,
}

impl ConstraintViolation {
    /// Violation of a whole-entity rule
    #[must_use]
    pub fn bean(message: impl Into<String>) -> Self {
        Self {
            path: Vec::new(),
            message: message.into(),
        }
    }

    /// Violation of a rule on one property
    #[must_use]
    pub fn property(property: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: vec![property.into()],
            message: message.into(),
        }
    }

    /// Whether the violation path ends at the validated entity itself
    #[must_use]
    pub fn is_bean_level(&self) -> bool {
        self.path.is_empty()
    }
}

/// Bean validation
pub trait Validator {
    fn validate_property(&self, entity: &EntityRef, property: &str) -> Vec<ConstraintViolation>;

    fn validate(&self, entity: &EntityRef, group: ValidationGroup) -> Vec<ConstraintViolation>;
}

/// Entity-level permissions
pub trait AccessManager {
    fn can_edit(&self, entity_name: &str) -> bool;
}

/// Everything a screen controller needs from its surroundings
#[derive(Clone)]
pub struct ScreenServices {
    pub locks: Rc<dyn LockManager>,
    pub notifications: Rc<dyn NotificationService>,
    pub dialogs: Rc<dyn DialogService>,
    pub validator: Rc<dyn Validator>,
    pub access: Rc<dyn AccessManager>,
    pub config: Rc<ScreensConfig>,
    pub messages: Rc<MessageCatalog>,
}

impl ScreenServices {
    /// Bundle collaborators with the default configuration
    pub fn new(
        locks: Rc<dyn LockManager>,
        notifications: Rc<dyn NotificationService>,
        dialogs: Rc<dyn DialogService>,
        validator: Rc<dyn Validator>,
        access: Rc<dyn AccessManager>,
    ) -> Self {
        Self {
            locks,
            notifications,
            dialogs,
            validator,
            access,
            config: Rc::new(ScreensConfig::default()),
            messages: Rc::new(MessageCatalog::default()),
        }
    }

    /// Replace the configuration and rebuild the message catalog from it
    #[must_use]
    pub fn with_config(mut self, config: ScreensConfig) -> Self {
        self.messages = Rc::new(MessageCatalog::from_config(&config));
        self.config = Rc::new(config);
        self
    }
}

impl fmt::Debug for ScreenServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScreenServices")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
