//! Runtime for suspending and resuming workflow instances.
//!
//! [`WorkflowHost`] drives the turn lifecycle: it loads an instance, lets
//! activity code advance it and commits the result. Commit diffs the
//! bookmarks, stores the delta and publishes [`WorkflowBookmarksIndexed`]
//! through the [`Mediator`]. The [`ScheduleBackgroundActivities`] handler
//! reacts to that notification by submitting background jobs and recording
//! their ids on the bookmarks that wait for them.
//!
//! [`LocalBackgroundScheduler`] and [`BackgroundWorker`] provide an
//! in-process job queue; any other [`BackgroundActivityScheduler`] can be
//! plugged in instead.

pub mod config;
pub mod error;
pub mod handlers;
pub mod host;
pub mod indexing;
pub mod mediator;
pub mod notifications;
pub mod registry;
pub mod scheduler;
pub mod worker;

pub use config::RuntimeConfig;
pub use error::{HostError, IndexingError};
pub use handlers::ScheduleBackgroundActivities;
pub use host::{WorkflowHost, WorkflowTurn};
pub use indexing::{BookmarkIndexer, IndexedWorkflowBookmarks};
pub use mediator::{Mediator, Notification, NotificationHandler};
pub use notifications::WorkflowBookmarksIndexed;
pub use registry::JobRegistry;
pub use scheduler::{
    BackgroundActivityScheduler, BackgroundJob, JobQueue, LocalBackgroundScheduler, SchedulerError,
};
pub use worker::{BackgroundWorker, JobCompletion, JobOutcome};

pub use workflow_persistence as persistence;
