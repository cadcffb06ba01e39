//! Deferred operation results
//!
//! An [`OperationResult`] is returned synchronously by user-facing operations
//! such as closing a screen or committing an editor. When the operation has to
//! wait for the user (a confirmation dialog is open), the result is returned
//! pending and is resumed later from the dialog's button handler.
//!
//! Continuations registered with [`OperationResult::then`] and
//! [`OperationResult::otherwise`] run synchronously from within
//! [`OperationResult::resume`], in registration order.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::warn;

use crate::error::{CoreError, CoreResult};

type Continuation = Box<dyn FnOnce()>;

/// Resolution status of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationStatus {
    /// The operation completed
    Success,
    /// The operation failed or was cancelled
    Fail,
    /// The operation is waiting for external input
    Unknown,
}

enum State {
    Resolved(OperationStatus),
    Pending {
        then: Vec<Continuation>,
        otherwise: Vec<Continuation>,
        /// Set once `resume` was called with a result that is itself pending
        awaiting: bool,
    },
}

/// Outcome of an operation that may need user input before it concludes
///
/// Cloning yields another handle to the same result.
#[derive(Clone)]
pub struct OperationResult {
    state: Rc<RefCell<State>>,
}

impl OperationResult {
    fn resolved(status: OperationStatus) -> Self {
        Self {
            state: Rc::new(RefCell::new(State::Resolved(status))),
        }
    }

    /// An operation that already succeeded
    #[must_use]
    pub fn success() -> Self {
        Self::resolved(OperationStatus::Success)
    }

    /// An operation that already failed
    #[must_use]
    pub fn fail() -> Self {
        Self::resolved(OperationStatus::Fail)
    }

    /// An operation whose outcome is not known yet
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            state: Rc::new(RefCell::new(State::Pending {
                then: Vec::new(),
                otherwise: Vec::new(),
                awaiting: false,
            })),
        }
    }

    /// `success()` when `ok`, `fail()` otherwise
    #[must_use]
    pub fn from_bool(ok: bool) -> Self {
        if ok {
            Self::success()
        } else {
            Self::fail()
        }
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> OperationStatus {
        match &*self.state.borrow() {
            State::Resolved(status) => *status,
            State::Pending { .. } => OperationStatus::Unknown,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status() == OperationStatus::Success
    }

    #[must_use]
    pub fn is_fail(&self) -> bool {
        self.status() == OperationStatus::Fail
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status() == OperationStatus::Unknown
    }

    /// Run `f` once the operation succeeds
    ///
    /// Runs immediately if the operation already succeeded and is dropped if
    /// it already failed.
    pub fn then(&self, f: impl FnOnce() + 'static) -> Self {
        match self.status() {
            OperationStatus::Success => f(),
            OperationStatus::Fail => {}
            OperationStatus::Unknown => {
                if let State::Pending { then, .. } = &mut *self.state.borrow_mut() {
                    then.push(Box::new(f));
                }
            }
        }
        self.clone()
    }

    /// Run `f` once the operation fails
    ///
    /// Runs immediately if the operation already failed and is dropped if it
    /// already succeeded.
    pub fn otherwise(&self, f: impl FnOnce() + 'static) -> Self {
        match self.status() {
            OperationStatus::Fail => f(),
            OperationStatus::Success => {}
            OperationStatus::Unknown => {
                if let State::Pending { otherwise, .. } = &mut *self.state.borrow_mut() {
                    otherwise.push(Box::new(f));
                }
            }
        }
        self.clone()
    }

    /// Resolve a pending result with the outcome of `result`
    ///
    /// If `result` is itself pending, this result resolves when `result`
    /// does. A pending result may be resumed exactly once: any further call
    /// is rejected and leaves the result and its continuations untouched.
    pub fn resume(&self, result: OperationResult) -> CoreResult<()> {
        match &*self.state.borrow() {
            State::Resolved(status) => {
                warn!(status = ?status, "rejected resume of an already resolved operation result");
                return Err(CoreError::AlreadyResolved { status: *status });
            }
            State::Pending { awaiting: true, .. } => {
                warn!("rejected resume of an operation result already awaiting another result");
                return Err(CoreError::AlreadyAwaiting);
            }
            State::Pending { .. } => {}
        }

        match result.status() {
            OperationStatus::Success => self.finish(OperationStatus::Success),
            OperationStatus::Fail => self.finish(OperationStatus::Fail),
            OperationStatus::Unknown => {
                if Rc::ptr_eq(&self.state, &result.state) {
                    return Err(CoreError::AlreadyAwaiting);
                }
                if let State::Pending { awaiting, .. } = &mut *self.state.borrow_mut() {
                    *awaiting = true;
                }
                let on_success = self.clone();
                let on_fail = self.clone();
                result
                    .then(move || on_success.finish(OperationStatus::Success))
                    .otherwise(move || on_fail.finish(OperationStatus::Fail));
            }
        }
        Ok(())
    }

    /// Shorthand for `resume(OperationResult::success())`
    pub fn resume_success(&self) -> CoreResult<()> {
        self.resume(Self::success())
    }

    /// Shorthand for `resume(OperationResult::fail())`
    pub fn resume_fail(&self) -> CoreResult<()> {
        self.resume(Self::fail())
    }

    /// Chain `next` after this operation
    ///
    /// `next` runs only if this operation succeeds; the returned result
    /// resolves with whatever `next` produces. A failure short-circuits.
    pub fn compose(&self, next: impl FnOnce() -> OperationResult + 'static) -> OperationResult {
        match self.status() {
            OperationStatus::Success => next(),
            OperationStatus::Fail => Self::fail(),
            OperationStatus::Unknown => {
                let composed = Self::unknown();
                let on_success = composed.clone();
                let on_fail = composed.clone();
                self.then(move || {
                    let _ = on_success.resume(next());
                })
                .otherwise(move || {
                    let _ = on_fail.resume(Self::fail());
                });
                composed
            }
        }
    }

    fn finish(&self, status: OperationStatus) {
        let continuations = {
            let mut state = self.state.borrow_mut();
            match std::mem::replace(&mut *state, State::Resolved(status)) {
                State::Pending { then, otherwise, .. } => {
                    if status == OperationStatus::Success {
                        then
                    } else {
                        otherwise
                    }
                }
                State::Resolved(previous) => {
                    *state = State::Resolved(previous);
                    Vec::new()
                }
            }
        };
        for continuation in continuations {
            continuation();
        }
    }
}

impl fmt::Debug for OperationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationResult")
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Box<dyn FnOnce()>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let make = move |tag: &'static str| {
            let sink = sink.clone();
            Box::new(move || sink.borrow_mut().push(tag)) as Box<dyn FnOnce()>
        };
        (log, make)
    }

    #[test]
    fn resolved_results_run_matching_callbacks_immediately() {
        let (log, make) = recorder();
        OperationResult::success().then(make("then")).otherwise(make("otherwise"));
        OperationResult::fail().then(make("then-2")).otherwise(make("otherwise-2"));
        assert_eq!(*log.borrow(), vec!["then", "otherwise-2"]);
    }

    #[test]
    fn pending_result_defers_until_resume() {
        let (log, make) = recorder();
        let result = OperationResult::unknown();
        result.then(make("a")).otherwise(make("x")).then(make("b"));
        assert!(log.borrow().is_empty());
        assert!(result.is_pending());

        result.resume_success().unwrap();
        assert_eq!(*log.borrow(), vec!["a", "b"]);
        assert!(result.is_success());
    }

    #[test]
    fn resume_fail_runs_only_otherwise() {
        let (log, make) = recorder();
        let result = OperationResult::unknown();
        result.then(make("a")).otherwise(make("x")).otherwise(make("y"));
        result.resume_fail().unwrap();
        assert_eq!(*log.borrow(), vec!["x", "y"]);
    }

    #[test]
    fn second_resume_is_rejected() {
        let (log, make) = recorder();
        let result = OperationResult::unknown();
        result.then(make("a"));
        result.resume_success().unwrap();

        let err = result.resume_fail().unwrap_err();
        assert_eq!(
            err,
            CoreError::AlreadyResolved {
                status: OperationStatus::Success
            }
        );
        assert!(result.is_success());
        assert_eq!(*log.borrow(), vec!["a"]);
    }

    #[test]
    fn resuming_an_immediate_result_is_rejected() {
        assert!(OperationResult::success().resume_success().is_err());
        assert!(OperationResult::fail().resume_success().is_err());
    }

    #[test]
    fn resume_with_pending_result_waits_for_it() {
        let outer = OperationResult::unknown();
        let inner = OperationResult::unknown();
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        outer.then(move || counter.set(counter.get() + 1));

        outer.resume(inner.clone()).unwrap();
        assert!(outer.is_pending());
        assert_eq!(outer.resume_success(), Err(CoreError::AlreadyAwaiting));

        inner.resume_success().unwrap();
        assert!(outer.is_success());
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn callbacks_registered_during_resume_run_immediately() {
        let result = OperationResult::unknown();
        let hits = Rc::new(Cell::new(0));
        let inner_result = result.clone();
        let counter = hits.clone();
        result.then(move || {
            let counter = counter.clone();
            inner_result.then(move || counter.set(counter.get() + 1));
        });
        result.resume_success().unwrap();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn compose_runs_next_only_on_success() {
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        let composed = OperationResult::fail().compose(move || {
            flag.set(true);
            OperationResult::success()
        });
        assert!(composed.is_fail());
        assert!(!ran.get());

        let composed = OperationResult::success().compose(OperationResult::unknown);
        assert!(composed.is_pending());
    }

    #[test]
    fn compose_on_pending_result_defers_next() {
        let first = OperationResult::unknown();
        let second = OperationResult::unknown();
        let next = second.clone();
        let composed = first.compose(move || next);
        assert!(composed.is_pending());

        first.resume_success().unwrap();
        assert!(composed.is_pending());

        second.resume_fail().unwrap();
        assert!(composed.is_fail());
    }

    #[test]
    fn compose_on_pending_failure_fails_without_next() {
        let first = OperationResult::unknown();
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        let composed = first.compose(move || {
            flag.set(true);
            OperationResult::success()
        });
        first.resume_fail().unwrap();
        assert!(composed.is_fail());
        assert!(!ran.get());
    }
}
