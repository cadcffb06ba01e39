//! Trellis Core - value types shared by the Trellis screen framework
//!
//! This crate holds the pieces of the screen lifecycle that carry no UI
//! knowledge:
//! - [`OperationResult`]: deferred success/fail outcome resumed by callbacks
//! - [`EventHub`]: typed event dispatch with trigger-once events
//! - [`ValidationErrors`]: ordered (component, message) problems
//! - Entity model: [`MetaClass`], [`Entity`], [`Value`], [`FetchPlan`]
//!
//! Everything here is single-threaded by construction (`Rc`/`RefCell`).

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Error types
pub mod error;

/// Deferred operation results
pub mod operation;

/// Typed event dispatch
pub mod event;

/// Validation error aggregation
pub mod validation;

/// Dynamic entity model
pub mod entity;

pub use entity::{
    deep_copy, key_of, Cardinality, Entity, EntityId, EntityKey, EntityRef, FetchPlan, MetaClass,
    MetaProperty, PropertyKind, Value,
};
pub use error::{CoreError, CoreResult};
pub use event::{Event, EventHub, Subscription};
pub use operation::{OperationResult, OperationStatus};
pub use validation::{ComponentId, ValidationError, ValidationErrors};
