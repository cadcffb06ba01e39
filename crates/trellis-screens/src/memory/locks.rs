//! Lock table shared by in-process sessions

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::services::{LockInfo, LockManager, LockResponse};

/// A call made through one of the table's sessions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockCall {
    Lock { user: String, resource: String, key: String },
    Unlock { user: String, resource: String, key: String },
}

/// Pessimistic locks keyed by resource and entity key
#[derive(Default)]
pub struct MemoryLockTable {
    locks: RefCell<HashMap<(String, String), LockInfo>>,
    unsupported: RefCell<HashSet<String>>,
    calls: RefCell<Vec<LockCall>>,
}

impl MemoryLockTable {
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Lock manager acting on behalf of `user`
    #[must_use]
    pub fn session(self: &Rc<Self>, user: impl Into<String>) -> MemoryLockManager {
        MemoryLockManager {
            table: self.clone(),
            user: user.into(),
        }
    }

    /// Disable locking for `resource`
    pub fn set_unsupported(&self, resource: impl Into<String>) {
        self.unsupported.borrow_mut().insert(resource.into());
    }

    /// Record a lock taken by another party, bypassing the call log
    pub fn acquire_as(&self, user: &str, resource: &str, key: &str, since: DateTime<Utc>) {
        self.locks.borrow_mut().insert(
            (resource.to_string(), key.to_string()),
            LockInfo {
                resource: resource.to_string(),
                key: key.to_string(),
                holder: user.to_string(),
                since,
            },
        );
    }

    /// Login holding the lock, if any
    #[must_use]
    pub fn holder(&self, resource: &str, key: &str) -> Option<String> {
        self.locks
            .borrow()
            .get(&(resource.to_string(), key.to_string()))
            .map(|info| info.holder.clone())
    }

    #[must_use]
    pub fn calls(&self) -> Vec<LockCall> {
        self.calls.borrow().clone()
    }

    #[must_use]
    pub fn lock_calls(&self) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|call| matches!(call, LockCall::Lock { .. }))
            .count()
    }

    #[must_use]
    pub fn unlock_calls(&self) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|call| matches!(call, LockCall::Unlock { .. }))
            .count()
    }

    fn lock(&self, user: &str, resource: &str, key: &str) -> LockResponse {
        self.calls.borrow_mut().push(LockCall::Lock {
            user: user.to_string(),
            resource: resource.to_string(),
            key: key.to_string(),
        });
        if self.unsupported.borrow().contains(resource) {
            return LockResponse::NotSupported;
        }

        let mut locks = self.locks.borrow_mut();
        let slot = (resource.to_string(), key.to_string());
        // Locks are not reentrant, not even for the holder's other screens.
        if let Some(info) = locks.get(&slot) {
            debug!(resource, key, holder = %info.holder, "lock refused");
            return LockResponse::Held(info.clone());
        }
        locks.insert(
            slot,
            LockInfo {
                resource: resource.to_string(),
                key: key.to_string(),
                holder: user.to_string(),
                since: Utc::now(),
            },
        );
        LockResponse::Acquired
    }

    fn unlock(&self, user: &str, resource: &str, key: &str) {
        self.calls.borrow_mut().push(LockCall::Unlock {
            user: user.to_string(),
            resource: resource.to_string(),
            key: key.to_string(),
        });
        let mut locks = self.locks.borrow_mut();
        let slot = (resource.to_string(), key.to_string());
        if locks.get(&slot).is_some_and(|info| info.holder == user) {
            locks.remove(&slot);
        }
    }
}

impl fmt::Debug for MemoryLockTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryLockTable")
            .field("locks", &self.locks.borrow().len())
            .field("calls", &self.calls.borrow().len())
            .finish_non_exhaustive()
    }
}

/// One user's view of a [`MemoryLockTable`]
#[derive(Debug, Clone)]
pub struct MemoryLockManager {
    table: Rc<MemoryLockTable>,
    user: String,
}

impl MemoryLockManager {
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }
}

impl LockManager for MemoryLockManager {
    fn lock(&self, resource: &str, key: &str) -> LockResponse {
        self.table.lock(&self.user, resource, key)
    }

    fn unlock(&self, resource: &str, key: &str) {
        self.table.unlock(&self.user, resource, key);
    }
}
