//! Trellis Screens - lifecycle controllers for data-bound screens
//!
//! A [`Screen`] owns a component [`Window`] and walks through a fixed
//! lifecycle: init, show, close, detach. Controllers layered on top add the
//! behavior of the common screen kinds:
//! - [`StandardEditor`]: edits one entity with pessimistic locking,
//!   validation, unsaved-changes detection and commit
//! - [`StandardLookup`]: returns a selection to its caller
//! - [`MasterDetailScreen`]: a browse list and an edit form in one window
//!
//! Outside collaborators (locks, notifications, dialogs, validation,
//! permissions) are passed in through [`ScreenServices`]. The [`memory`]
//! module provides in-process implementations of all of them.

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error types for screen operations
pub mod error;

/// Configuration loaded from `trellis.toml`
pub mod config;

/// Localizable message catalog
pub mod messages;

/// Collaborator interfaces
pub mod services;

/// Data contexts, containers and loaders
pub mod data;

/// Component tree of a screen window
pub mod component;

/// Pessimistic lock handling for editors
pub mod lock;

/// Component validation and confirmation dialogs
pub mod validation;

/// Screen base lifecycle and screen stack
pub mod screen;

/// Single-entity editor screens
pub mod editor;

/// Lookup screens
pub mod lookup;

/// Combined browse and edit screens
pub mod master_detail;

/// In-memory collaborators
pub mod memory;

// Re-exports for convenience
pub use component::{
    Component, ComponentKind, ComponentState, Field, FieldBinding, ListAction, ListActionKind,
    ListComponent, Window,
};
pub use config::{ConfigError, ScreensConfig};
pub use data::{
    CollectionContainer, DataContext, DataError, EntityLoader, InstanceContainer, ScreenData,
};
pub use editor::{
    AfterCommitChangesEvent, BeforeCommitChangesEvent, InitEntityEvent, StandardEditor,
};
pub use error::{ScreenError, ScreenResult};
pub use lock::{LockState, LockStatus, PessimisticLockSupport};
pub use lookup::{SelectValidationContext, StandardLookup};
pub use master_detail::{MasterDetailLayout, MasterDetailScreen};
pub use messages::MessageCatalog;
pub use screen::{CloseAction, LifecyclePhase, Screen, ScreenId, ScreenStack, ShowAbortedEvent};
pub use services::{NotificationType, ScreenServices};
pub use validation::ScreenValidation;
