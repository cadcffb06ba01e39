//! In-process implementations of every screen collaborator
//!
//! Useful for headless hosts and for exercising screens in tests. Nothing in
//! here renders or persists beyond the current process.

mod data;
mod locks;
mod rules;
mod ui;

use std::rc::Rc;

pub use data::{MemoryDataContext, MemoryEntityLoader, MemoryStore};
pub use locks::{LockCall, MemoryLockManager, MemoryLockTable};
pub use rules::{RuleValidator, StaticAccess};
pub use ui::{MemoryDialogs, MemoryNotifications, Notification};

use crate::config::ScreensConfig;
use crate::services::ScreenServices;

/// One user's set of in-memory collaborators
#[derive(Debug, Clone)]
pub struct MemoryServices {
    pub locks: Rc<MemoryLockTable>,
    pub notifications: Rc<MemoryNotifications>,
    pub dialogs: Rc<MemoryDialogs>,
    pub validator: Rc<RuleValidator>,
    pub access: Rc<StaticAccess>,
    pub user: String,
    config: ScreensConfig,
}

impl MemoryServices {
    /// Fresh collaborators for `user` with a private lock table
    #[must_use]
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            locks: MemoryLockTable::new(),
            notifications: Rc::new(MemoryNotifications::new()),
            dialogs: Rc::new(MemoryDialogs::new()),
            validator: Rc::new(RuleValidator::new()),
            access: Rc::new(StaticAccess::allow_all()),
            user: user.into(),
            config: ScreensConfig::default(),
        }
    }

    /// Share `table` with other sessions
    #[must_use]
    pub fn with_lock_table(mut self, table: &Rc<MemoryLockTable>) -> Self {
        self.locks = table.clone();
        self
    }

    #[must_use]
    pub fn with_validator(mut self, validator: RuleValidator) -> Self {
        self.validator = Rc::new(validator);
        self
    }

    #[must_use]
    pub fn with_access(mut self, access: StaticAccess) -> Self {
        self.access = Rc::new(access);
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: ScreensConfig) -> Self {
        self.config = config;
        self
    }

    /// Service bundle handed to screen controllers
    #[must_use]
    pub fn services(&self) -> ScreenServices {
        ScreenServices::new(
            Rc::new(self.locks.session(self.user.clone())),
            self.notifications.clone(),
            self.dialogs.clone(),
            self.validator.clone(),
            self.access.clone(),
        )
        .with_config(self.config.clone())
    }
}
