mod support;

use chat_backend::{
    BackendError, ChatId, FeedSpec, RunStatus, SenderKind, MESSAGES_TABLE,
};
use chat_backend_mock::MockOp;
use chat_session::{LoadOutcome, NotificationKind, SessionPhase, WriteOp, WriteOutcome};
use pretty_assertions::assert_eq;
use serde_json::json;
use support::{agent, contents, Harness, CHAT_A};

#[tokio::test]
async fn sentinel_chat_stays_idle_without_remote_work() {
    let h = Harness::new();

    assert_eq!(h.open(ChatId::UNSET).await, LoadOutcome::Idle);

    assert_eq!(h.session.phase(), SessionPhase::Idle);
    assert_eq!(h.remote.message_fetches(ChatId::UNSET), 0);
    assert_eq!(h.hub.opened_count(), 0);
    assert!(h.session.messages().is_empty());
}

#[tokio::test]
async fn loading_a_chat_applies_snapshot_status_and_opens_both_feeds() {
    let h = Harness::new();
    h.remote.seed_messages(CHAT_A, vec![agent(1, CHAT_A, "welcome")]);
    h.remote.set_status(CHAT_A, RunStatus::Ready);

    let pending = h.session.set_active_chat(CHAT_A);
    assert!(h.session.is_loading());
    assert_eq!(pending.wait().await, Some(LoadOutcome::Ready));

    assert_eq!(h.session.phase(), SessionPhase::Ready);
    assert_eq!(h.session.messages(), vec![agent(1, CHAT_A, "welcome")]);
    assert_eq!(h.session.status(), RunStatus::Ready);
    assert!(h.session.feeds_open());
    assert_eq!(
        h.hub.active_feeds(),
        vec![
            FeedSpec::message_inserts(CHAT_A),
            FeedSpec::status_updates(CHAT_A)
        ]
    );
    assert!(h.notifications().is_empty());
}

#[tokio::test]
async fn send_is_rendered_before_delivery_and_kept_when_delivery_fails() {
    let h = Harness::new();
    h.remote.seed_messages(CHAT_A, vec![agent(1, CHAT_A, "welcome")]);
    h.open(CHAT_A).await;
    h.remote
        .fail(MockOp::Send, BackendError::transport("connection refused"));

    let pending = h.session.send("hi");

    let messages = h.session.messages();
    assert_eq!(contents(&messages), vec!["welcome", "hi"]);
    let optimistic = &messages[1];
    assert_eq!(optimistic.kind, SenderKind::User);
    assert_eq!(optimistic.sender.as_deref(), Some("user"));
    assert!(optimistic.id.is_local());
    assert!(optimistic.created.is_some());

    assert_eq!(pending.wait().await, Some(WriteOutcome::Failed));
    assert_eq!(contents(&h.session.messages()), vec!["welcome", "hi"]);

    let notifications = h.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(
        notifications[0].kind,
        NotificationKind::WriteFailure(WriteOp::Send)
    );
    assert_eq!(notifications[0].title, "Failed to send message");
    assert_eq!(notifications[0].chat, CHAT_A);
}

#[tokio::test]
async fn agent_rows_from_the_insert_feed_are_appended() {
    let h = Harness::new();
    h.remote.seed_messages(CHAT_A, vec![agent(1, CHAT_A, "welcome")]);
    h.open(CHAT_A).await;

    let delivered = h.hub.publish_insert(
        MESSAGES_TABLE,
        json!({"id": 2, "chat_id": 42, "type": "assistant", "sender": "agent", "content": "hello"}),
    );

    assert_eq!(delivered, 1);
    assert_eq!(
        h.session.messages(),
        vec![agent(1, CHAT_A, "welcome"), agent(2, CHAT_A, "hello")]
    );
}

#[tokio::test]
async fn failed_clear_leaves_the_transcript_in_place() {
    let h = Harness::new();
    h.remote.seed_messages(CHAT_A, vec![agent(1, CHAT_A, "welcome")]);
    h.open(CHAT_A).await;
    h.remote.fail(MockOp::Clear, BackendError::status(500, "boom"));

    let pending = h.session.clear_transcript();
    assert!(h.session.is_clearing());
    assert_eq!(h.session.messages().len(), 1);

    assert_eq!(pending.wait().await, Some(WriteOutcome::Failed));
    assert!(!h.session.is_clearing());
    assert_eq!(h.session.messages(), vec![agent(1, CHAT_A, "welcome")]);
    let notifications = h.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].title, "Failed to clear messages");
}

#[tokio::test]
async fn successful_clear_empties_the_transcript_after_the_remote_delete() {
    let h = Harness::new();
    h.remote
        .seed_messages(CHAT_A, vec![agent(1, CHAT_A, "a"), agent(2, CHAT_A, "b")]);
    h.open(CHAT_A).await;

    let pending = h.session.clear_transcript();
    assert_eq!(h.session.messages().len(), 2);
    assert_eq!(pending.wait().await, Some(WriteOutcome::Completed));

    assert!(h.session.messages().is_empty());
    assert_eq!(h.remote.clears(), vec![CHAT_A]);
    assert!(h.remote.stored_messages(CHAT_A).is_empty());
}

#[tokio::test]
async fn status_feed_overwrites_the_snapshot_status() {
    let h = Harness::new();
    h.remote.set_status(CHAT_A, RunStatus::Ready);
    h.open(CHAT_A).await;

    h.remote.publish_status(CHAT_A, RunStatus::Running);
    let view = h.session.view();
    assert_eq!(view.status, RunStatus::Running);
    assert!(view.run_in_progress);
    assert!(!view.input_disabled);

    h.remote.publish_status(CHAT_A, RunStatus::Failed);
    let view = h.session.view();
    assert!(!view.run_in_progress);
    assert!(view.input_disabled);
}

#[tokio::test]
async fn abort_leaves_status_to_the_feed() {
    let h = Harness::new();
    h.remote.set_status(CHAT_A, RunStatus::Running);
    h.open(CHAT_A).await;
    assert_eq!(h.session.status(), RunStatus::Running);

    assert_eq!(
        h.session.abort().wait().await,
        Some(WriteOutcome::Completed)
    );

    assert_eq!(h.remote.aborts(), vec![CHAT_A]);
    assert_eq!(h.session.status(), RunStatus::Aborted);
}

#[tokio::test]
async fn failed_abort_notifies_and_keeps_local_status() {
    let h = Harness::new();
    h.remote.set_status(CHAT_A, RunStatus::Running);
    h.open(CHAT_A).await;
    h.remote
        .fail(MockOp::Abort, BackendError::timeout("request timed out"));

    assert_eq!(h.session.abort().wait().await, Some(WriteOutcome::Failed));

    assert_eq!(h.session.status(), RunStatus::Running);
    let notifications = h.notifications();
    assert_eq!(notifications.len(), 1);
    assert_eq!(
        notifications[0].kind,
        NotificationKind::WriteFailure(WriteOp::Abort)
    );
    assert_eq!(notifications[0].title, "Failed to abort chat");
}

#[tokio::test]
async fn actions_without_an_active_chat_are_rejected() {
    let h = Harness::new();

    assert_eq!(h.session.send("hi").wait().await, Some(WriteOutcome::Rejected));
    assert_eq!(h.session.abort().wait().await, Some(WriteOutcome::Rejected));
    assert_eq!(
        h.session.clear_transcript().wait().await,
        Some(WriteOutcome::Rejected)
    );

    assert!(h.session.messages().is_empty());
    assert!(h.remote.sent().is_empty());
    assert!(h.remote.aborts().is_empty());
    let titles: Vec<_> = h
        .notifications()
        .into_iter()
        .map(|notification| notification.title)
        .collect();
    assert_eq!(
        titles,
        vec![
            "Failed to send message",
            "Failed to abort chat",
            "Failed to clear messages"
        ]
    );
}

#[tokio::test]
async fn blank_messages_are_ignored_silently() {
    let h = Harness::new();
    h.open(CHAT_A).await;

    assert_eq!(
        h.session.send("   \n").wait().await,
        Some(WriteOutcome::Rejected)
    );

    assert!(h.session.messages().is_empty());
    assert!(h.remote.sent().is_empty());
    assert!(h.notifications().is_empty());
}
