//! Error types for the Trellis screen framework
//!
//! These cover programmer and configuration faults only. Validation problems
//! and lock contention are reported as values, never as errors.

use thiserror::Error;
use trellis_core::{ComponentId, CoreError};

use crate::data::DataError;
use crate::screen::{LifecyclePhase, ScreenId};

/// Screen lifecycle errors
#[derive(Debug, Error)]
pub enum ScreenError {
    /// Operation invoked in the wrong lifecycle phase
    #[error("screen {screen}: cannot {operation} while {phase:?}")]
    IllegalState {
        screen: ScreenId,
        operation: &'static str,
        phase: LifecyclePhase,
    },

    /// A `BeforeShowEvent` listener aborted showing the screen
    #[error("screen {screen}: show aborted: {reason}")]
    ShowAborted { screen: ScreenId, reason: String },

    /// The screen declares no container under the expected id
    #[error("screen {screen}: missing data container '{container}'")]
    MissingContainer { screen: ScreenId, container: String },

    /// The screen has no data loader bound to the edited container
    #[error("screen {screen}: no loader is bound to container '{container}'")]
    MissingLoader { screen: ScreenId, container: String },

    /// The screen has no `ScreenData` extension
    #[error("screen {0}: screen data is not attached")]
    MissingScreenData(ScreenId),

    /// The editor was shown before an entity to edit was set
    #[error("screen {0}: entity to edit is not set")]
    EntityNotSet(ScreenId),

    #[error("component '{0}' not found")]
    ComponentNotFound(ComponentId),

    #[error("component '{0}' is not a field")]
    NotAField(ComponentId),

    #[error("component '{0}' is not a list")]
    NotAList(ComponentId),

    /// The user cannot edit the field in its current state
    #[error("field '{0}' is read-only")]
    ReadOnlyField(ComponentId),

    #[error("field '{0}' is bound to an empty container")]
    EmptyContainer(ComponentId),

    /// `enable_editing` called although no lock conflict offered it
    #[error("screen {0}: editing cannot be enabled")]
    EnableEditingUnavailable(ScreenId),

    /// A detail-editing operation was invoked outside edit mode
    #[error("screen {0}: not in edit mode")]
    NotEditing(ScreenId),

    #[error("screen {0}: already in edit mode")]
    AlreadyEditing(ScreenId),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type alias for screen operations
pub type ScreenResult<T> = Result<T, ScreenError>;
