//! Pessimistic locking of edited entities
//!
//! One [`PessimisticLockSupport`] tracks the lock a single screen holds on a
//! single entity. Lock contention is reported to the user and returned as a
//! value; it never fails the calling operation.

use std::cell::{Cell, RefCell};
use std::fmt::Write;

use tracing::{debug, info, warn};
use trellis_core::EntityRef;

use crate::messages::{ENTITY_LOCKED_CAPTION, ENTITY_LOCKED_DESCRIPTION};
use crate::services::{LockInfo, LockResponse, NotificationType, ScreenServices};

/// Lock state of one screen/entity pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    /// Held by this session
    Locked,
    /// Held by another session
    LockFailed,
    /// Locking is not configured for the entity
    NotSupported,
}

/// Outcome of [`PessimisticLockSupport::lock`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    Locked,
    Failed,
    NotSupported,
}

#[derive(Debug)]
pub struct PessimisticLockSupport {
    services: ScreenServices,
    state: Cell<LockState>,
    /// Resource and key of the last lock attempt
    target: RefCell<Option<(String, String)>>,
    conflict: RefCell<Option<LockInfo>>,
}

impl PessimisticLockSupport {
    #[must_use]
    pub fn new(services: ScreenServices) -> Self {
        Self {
            services,
            state: Cell::new(LockState::Unlocked),
            target: RefCell::new(None),
            conflict: RefCell::new(None),
        }
    }

    #[must_use]
    pub fn state(&self) -> LockState {
        self.state.get()
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.state.get() == LockState::Locked
    }

    /// Lock held by another session after a failed attempt
    #[must_use]
    pub fn conflict(&self) -> Option<LockInfo> {
        self.conflict.borrow().clone()
    }

    /// Lock `entity` for this session
    ///
    /// A lock this support already holds on another entity is released first.
    pub fn lock(&self, entity: &EntityRef) -> LockStatus {
        let target = {
            let entity = entity.borrow();
            (entity.entity_name().to_string(), entity.id().to_string())
        };
        if self.is_locked() {
            if self.target.borrow().as_ref() == Some(&target) {
                return LockStatus::Locked;
            }
            self.unlock();
        }

        let (resource, key) = &target;
        let response = self.services.locks.lock(resource, key);
        *self.target.borrow_mut() = Some(target.clone());
        match response {
            LockResponse::Acquired => {
                info!(resource = %resource, key = %key, "acquired pessimistic lock");
                self.state.set(LockState::Locked);
                *self.conflict.borrow_mut() = None;
                LockStatus::Locked
            }
            LockResponse::Held(holder) => {
                warn!(
                    resource = %resource,
                    key = %key,
                    holder = %holder.holder,
                    "entity is locked by another session"
                );
                self.notify_conflict(&holder);
                self.state.set(LockState::LockFailed);
                *self.conflict.borrow_mut() = Some(holder);
                LockStatus::Failed
            }
            LockResponse::NotSupported => {
                debug!(resource = %resource, "pessimistic locking is not supported");
                self.state.set(LockState::NotSupported);
                LockStatus::NotSupported
            }
        }
    }

    /// Release the lock if this session holds it
    ///
    /// Safe to call any number of times; the lock manager is called at most
    /// once per acquired lock.
    pub fn unlock(&self) {
        if self.state.replace(LockState::Unlocked) != LockState::Locked {
            return;
        }
        if let Some((resource, key)) = self.target.borrow().as_ref() {
            self.services.locks.unlock(resource, key);
            info!(resource = %resource, key = %key, "released pessimistic lock");
        }
    }

    fn notify_conflict(&self, holder: &LockInfo) {
        let messages = &self.services.messages;
        let since = format_timestamp(holder, &self.services.config.locks.timestamp_format);
        let description = messages.format(
            ENTITY_LOCKED_DESCRIPTION,
            &[("user", holder.holder.as_str()), ("since", since.as_str())],
        );
        self.services.notifications.show(
            NotificationType::Humanized,
            messages.get(ENTITY_LOCKED_CAPTION),
            Some(&description),
        );
    }
}

fn format_timestamp(holder: &LockInfo, pattern: &str) -> String {
    let mut out = String::new();
    if write!(out, "{}", holder.since.format(pattern)).is_err() {
        warn!(pattern = %pattern, "invalid lock timestamp format");
        return holder.since.to_rfc3339();
    }
    out
}
