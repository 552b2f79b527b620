//! Schematic Model
//!
//! Components, aspects, the connection index and the undo log.
//!
//! An [`Aspect`] owns its components by [`ComponentId`]; connection points
//! are addressed with [`CpRef`]. Edits happen inside an action:
//!
//! ```rust
//! use schemnet::model::Aspect;
//!
//! let mut aspect = Aspect::new("schematic");
//! aspect.start_action()?;
//! aspect.add_wire(0, 0, 32, 0)?;
//! aspect.end_action()?;
//! assert!(aspect.can_undo());
//! # Ok::<(), schemnet::model::ModelError>(())
//! ```

pub mod action;
pub mod aspect;
pub mod component;
pub mod connection;
mod wires;

pub use action::{ActionLog, Change, Transaction};
pub use aspect::Aspect;
pub use component::{Component, ComponentKind, Graphic, Placement};
pub use connection::{ComponentId, ConnectionPoint, CpRef};

/// Errors raised while building or editing the model.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("No action in progress; call start_action first")]
    NoActiveAction,

    #[error("An action is already in progress")]
    NestedAction,

    #[error("Unknown component: {0}")]
    UnknownComponent(ComponentId),

    #[error("Invalid component: {0}")]
    InvalidComponent(String),

    #[error("Unknown module: {0}")]
    UnknownModule(String),

    #[error("Invalid library: {0}")]
    InvalidLibrary(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
