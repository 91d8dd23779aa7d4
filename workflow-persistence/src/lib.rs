//! Persistence layer for workflow state and bookmarks.
//!
//! This crate provides the storage boundary of the engine:
//!
//! - **PersistentBackend**: a trait covering the durable workflow-state store
//!   (snapshots) and the durable bookmark store (trigger matching by hash).
//! - **StoredBookmark**: the bookmark record kept in the bookmark store.
//! - **InMemoryBackend**: a reference implementation using in-memory maps.
//!
//! # Example
//!
//! ```rust,ignore
//! use workflow_persistence::{InMemoryBackend, PersistentBackend};
//! use workflow_core::snapshot::WorkflowInstanceSnapshot;
//!
//! let backend = InMemoryBackend::new();
//!
//! // Save a snapshot
//! backend.import_workflow_state(WorkflowInstanceSnapshot::capture(&context)).await?;
//!
//! // Load it back
//! let loaded = backend.load_snapshot("instance-123").await?;
//! ```
//!
//! # Implementing Custom Backends
//!
//! 1. Add `workflow-persistence` as a dependency
//! 2. Implement the `PersistentBackend` trait
//! 3. Reject snapshots older than the stored version
//! 4. Index stored bookmarks by hash for trigger matching

mod backend;
mod in_memory;
mod stored;

pub use backend::{BackendError, PersistentBackend};
pub use in_memory::InMemoryBackend;
pub use stored::StoredBookmark;
