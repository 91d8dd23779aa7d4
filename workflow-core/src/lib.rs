//! Core model of the suspension/resumption subsystem.
//!
//! - [`context::WorkflowExecutionContext`]: activity tree, bookmarks, version,
//!   per-turn transient state and completion callbacks of one instance.
//! - [`bookmark`]: suspension points and their matching hash.
//! - [`signal`]: behaviors, signals and the dispatcher that delivers them.
//! - [`snapshot`]: the durable representation used for storage and recovery.

pub mod activity;
pub mod background;
pub mod bookmark;
pub mod callback;
pub mod codec;
pub mod context;
pub mod error;
pub mod primitives;
pub mod serialization;
pub mod signal;
pub mod snapshot;
pub mod transient;

pub use error::WorkflowError;
