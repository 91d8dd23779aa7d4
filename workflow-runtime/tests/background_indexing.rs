mod common;

use common::*;
use std::sync::Arc;
use workflow_core::background::{BACKGROUND_ACTIVITY_BOOKMARK, ScheduledBackgroundActivity};
use workflow_core::bookmark::{BookmarkHasher, Sha256BookmarkHasher};
use workflow_core::context::WorkflowExecutionContext;
use workflow_core::primitives::{ActivityId, BookmarkId};
use workflow_core::serialization::JsonCodec;
use workflow_persistence::StoredBookmark;
use workflow_runtime::{
    IndexedWorkflowBookmarks, IndexingError, Mediator, ScheduleBackgroundActivities,
    WorkflowBookmarksIndexed,
};

type Handler = ScheduleBackgroundActivities<ScriptedScheduler, RecordingBackend, JsonCodec>;

fn handler(
    job_ids: &[&str],
) -> (Handler, Arc<ScriptedScheduler>, Arc<RecordingBackend>) {
    let scheduler = Arc::new(ScriptedScheduler::returning(job_ids.iter().copied()));
    let backend = Arc::new(RecordingBackend::default());
    let handler =
        ScheduleBackgroundActivities::new(scheduler.clone(), backend.clone(), Arc::new(JsonCodec));
    (handler, scheduler, backend)
}

#[tokio::test]
async fn test_job_id_recorded_on_bookmark() {
    init_tracing();
    let mut context = WorkflowExecutionContext::new("order-flow", INSTANCE_ID);
    let root = context.spawn_activity(ActivityId::new("flow"), None).unwrap();
    let node = context
        .spawn_activity(ActivityId::new("charge"), Some(&root))
        .unwrap();
    let bookmark_id = context
        .create_bookmark(&node, "job-wait", empty_background_payload(), &Sha256BookmarkHasher)
        .unwrap();
    context.schedule_background_activity(ScheduledBackgroundActivity {
        workflow_instance_id: INSTANCE_ID.to_string(),
        activity_id: ActivityId::new("charge"),
        activity_instance_id: node.clone(),
        bookmark_id: bookmark_id.clone(),
        input: serde_json::Value::Null,
    });
    let h0 = context.bookmarks().find(&bookmark_id).unwrap().hash().to_string();
    assert_eq!(h0, Sha256BookmarkHasher.hash("job-wait", b"{}"));

    let (handler, scheduler, backend) = handler(&["J-42"]);
    let updated = handler.index_background_activities(&mut context).await.unwrap();
    assert_eq!(updated, 1);
    assert_eq!(scheduler.call_count(), 1);

    let replaced = context.bookmarks().find(&bookmark_id).unwrap();
    assert_eq!(replaced.name, "job-wait");
    assert_eq!(replaced.payload(), br#"{"jobId":"J-42"}"#);
    assert_ne!(replaced.hash(), h0);
    assert_eq!(
        replaced.hash(),
        Sha256BookmarkHasher.hash("job-wait", br#"{"jobId":"J-42"}"#)
    );
    assert_eq!(context.bookmarks().len(), 1);

    assert_eq!(
        backend.updates(),
        vec![StoredBookmark::from_bookmark(replaced, INSTANCE_ID, None)]
    );
    let imports = backend.imports();
    assert_eq!(imports.len(), 1);
    assert_eq!(imports[0].workflow_state.bookmarks, *context.bookmarks());
    assert!(context.transient().background_activities().is_empty());
}

#[tokio::test]
async fn test_empty_batch_writes_nothing() {
    let mut context = WorkflowExecutionContext::new("order-flow", INSTANCE_ID);
    let (handler, scheduler, backend) = handler(&["J-1"]);

    let updated = handler.index_background_activities(&mut context).await.unwrap();

    assert_eq!(updated, 0);
    assert_eq!(scheduler.call_count(), 0);
    assert!(backend.updates().is_empty());
    assert!(backend.imports().is_empty());
}

#[tokio::test]
async fn test_second_run_schedules_nothing() {
    let (mut context, _) = suspended_context(2);
    let (handler, scheduler, backend) = handler(&["J-1", "J-2", "J-3"]);

    assert_eq!(handler.index_background_activities(&mut context).await.unwrap(), 2);
    let after_first = context.bookmarks().clone();
    backend.reset();

    assert_eq!(handler.index_background_activities(&mut context).await.unwrap(), 0);
    assert_eq!(scheduler.call_count(), 2);
    assert_eq!(context.bookmarks(), &after_first);
    assert!(backend.updates().is_empty());
    assert!(backend.imports().is_empty());
}

#[tokio::test]
async fn test_request_for_scheduled_bookmark_is_skipped() {
    let (mut context, _) = suspended_context(1);
    let request = context.transient().background_activities()[0].clone();
    let (handler, scheduler, backend) = handler(&["J-1", "J-2"]);
    handler.index_background_activities(&mut context).await.unwrap();
    let after_first = context.bookmarks().clone();
    backend.reset();

    // A retried turn raises the same request again.
    context.schedule_background_activity(request);
    let updated = handler.index_background_activities(&mut context).await.unwrap();

    assert_eq!(updated, 0);
    assert_eq!(scheduler.call_count(), 1);
    assert_eq!(context.bookmarks(), &after_first);
    assert!(backend.updates().is_empty());
    assert!(backend.imports().is_empty());
    assert!(context.transient().background_activities().is_empty());
}

#[tokio::test]
async fn test_scheduling_failure_commits_nothing() {
    let (mut context, _) = suspended_context(3);
    let before = context.bookmarks().clone();
    let (handler, scheduler, backend) = handler(&["J-1", "J-2"]);

    let err = handler
        .index_background_activities(&mut context)
        .await
        .unwrap_err();

    assert!(matches!(err, IndexingError::Scheduling { .. }));
    assert_eq!(scheduler.call_count(), 3);
    assert_eq!(context.bookmarks(), &before);
    assert!(backend.updates().is_empty());
    assert!(backend.imports().is_empty());
    // The requests stay queued so the turn can be retried as a whole.
    assert_eq!(context.transient().background_activities().len(), 3);
}

#[tokio::test]
async fn test_missing_bookmark_is_consistency_fault() {
    let (mut context, _) = suspended_context(1);
    let mut orphan = context.transient().background_activities()[0].clone();
    orphan.bookmark_id = BookmarkId::new("ghost");
    context.schedule_background_activity(orphan);
    let before = context.bookmarks().clone();
    let (handler, scheduler, backend) = handler(&["J-1", "J-2"]);

    let err = handler
        .index_background_activities(&mut context)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        IndexingError::Consistency { ref bookmark_id } if bookmark_id.as_str() == "ghost"
    ));
    assert_eq!(scheduler.call_count(), 0);
    assert_eq!(context.bookmarks(), &before);
    assert!(backend.updates().is_empty());
    assert!(backend.imports().is_empty());
}

#[tokio::test]
async fn test_undecodable_payload_is_serialization_failure() {
    let mut context = WorkflowExecutionContext::new("order-flow", INSTANCE_ID);
    let node = context.spawn_activity(ActivityId::new("charge"), None).unwrap();
    let bookmark_id = context
        .create_bookmark(
            &node,
            BACKGROUND_ACTIVITY_BOOKMARK,
            bytes::Bytes::from_static(b"not json"),
            &Sha256BookmarkHasher,
        )
        .unwrap();
    context.schedule_background_activity(ScheduledBackgroundActivity {
        workflow_instance_id: INSTANCE_ID.to_string(),
        activity_id: ActivityId::new("charge"),
        activity_instance_id: node,
        bookmark_id,
        input: serde_json::Value::Null,
    });
    let (handler, scheduler, backend) = handler(&["J-1"]);

    let err = handler
        .index_background_activities(&mut context)
        .await
        .unwrap_err();

    assert!(matches!(err, IndexingError::Serialization(_)));
    assert_eq!(scheduler.call_count(), 0);
    assert!(backend.updates().is_empty());
}

#[tokio::test]
async fn test_state_serialization_failure_restores_bookmarks() {
    let (mut context, _) = suspended_context(2);
    let before = context.bookmarks().clone();
    let (handler, _, backend) = handler(&["J-1", "J-2"]);
    let handler = handler.with_serializer(Arc::new(FailingSerializer));

    let err = handler
        .index_background_activities(&mut context)
        .await
        .unwrap_err();

    assert!(matches!(err, IndexingError::Serialization(_)));
    assert_eq!(context.bookmarks(), &before);
    assert!(backend.updates().is_empty());
    assert!(backend.imports().is_empty());
}

#[tokio::test]
async fn test_store_failure_skips_state_import() {
    let (mut context, _) = suspended_context(1);
    let (handler, _, backend) = handler(&["J-1"]);
    backend.fail_updates(true);

    let err = handler
        .index_background_activities(&mut context)
        .await
        .unwrap_err();

    assert!(matches!(err, IndexingError::Store(_)));
    assert!(backend.imports().is_empty());
}

#[tokio::test]
async fn test_runs_as_notification_handler() {
    let (context, bookmark_ids) = suspended_context(1);
    let (handler, _, backend) = handler(&["J-7"]);
    let mediator = Mediator::new().with_handler::<WorkflowBookmarksIndexed>(Arc::new(handler));

    let mut notification = WorkflowBookmarksIndexed {
        context,
        indexed_bookmarks: IndexedWorkflowBookmarks::default(),
    };
    mediator.publish(&mut notification).await.unwrap();

    let bookmark = notification
        .context
        .bookmarks()
        .find(&bookmark_ids[0])
        .unwrap();
    assert_eq!(bookmark.payload(), br#"{"jobId":"J-7"}"#);
    assert_eq!(backend.updates().len(), 1);
    assert_eq!(backend.imports().len(), 1);
}
