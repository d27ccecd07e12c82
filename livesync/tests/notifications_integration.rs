
use std::sync::Arc;
use std::time::Duration;

use livesync::error::ActionError;
use livesync::metrics::Counters;
use livesync::resources::{Notification, Notifications};
use livesync::session::SessionContext;
use mock_fetcher::{MockCommands, ScriptedFetcher, Step};
use tokio::sync::Notify;
use tokio::time::sleep;

const EVERY: Duration = Duration::from_secs(15);
const MS: Duration = Duration::from_millis(1);

fn note(id: &str, read: bool) -> Notification {
    Notification {
        id: id.into(),
        title: "Trade update".into(),
        message: format!("update {id}"),
        kind: "trade".into(),
        read,
        created_at: None,
    }
}

fn feed(
    script: Vec<Step<Vec<Notification>>>,
    then: Vec<Notification>,
    commands: MockCommands,
) -> (Notifications, Arc<MockCommands>, Counters) {
    let commands = Arc::new(commands);
    let counters = Counters::default();
    let notes = Notifications::with_parts(
        ScriptedFetcher::new("backend", script, Ok(then)),
        commands.clone(),
        SessionContext::new("u1"),
        EVERY,
        counters.clone(),
    );
    (notes, commands, counters)
}

#[tokio::test(start_paused = true)]
async fn badge_clears_when_server_returns_no_notifications() {
    let (mut notes, _, _) = feed(
        vec![Step::Ready(Ok(vec![
            note("a", false),
            note("b", false),
            note("c", false),
        ]))],
        vec![],
        MockCommands::default(),
    );

    assert!(notes.start());
    let mut rx = notes.subscribe();
    rx.changed().await.unwrap();
    assert_eq!(notes.snapshot().view.unwrap().badge(), Some(3));

    sleep(EVERY + MS).await;
    let view = notes.snapshot().view.unwrap();
    assert!(view.items.is_empty());
    assert_eq!(view.unread_count, 0);
    assert_eq!(view.badge(), None);
}

#[tokio::test(start_paused = true)]
async fn mark_read_survives_a_poll_that_predates_it() {
    let gate = Arc::new(Notify::new());
    let (mut notes, commands, counters) = feed(
        vec![
            Step::Ready(Ok(vec![note("abc123", false), note("x", false)])),
            Step::Ready(Ok(vec![note("abc123", false), note("x", false)])),
        ],
        vec![note("abc123", true), note("x", false)],
        MockCommands {
            gate: Some(gate.clone()),
            ..Default::default()
        },
    );

    notes.start();
    let mut rx = notes.subscribe();
    rx.changed().await.unwrap();

    let (res, ()) = tokio::join!(notes.mark_read("abc123"), async {
        // Request still in flight; this poll still says unread.
        sleep(EVERY + MS).await;
        let view = notes.snapshot().view.unwrap();
        assert!(view.items.iter().find(|n| n.id == "abc123").unwrap().read);
        assert_eq!(view.unread_count, 1);
        gate.notify_one();
    });
    res.unwrap();

    assert_eq!(commands.posted.lock()[0].0, "/notifications/abc123/read");

    sleep(EVERY).await;
    let view = notes.snapshot().view.unwrap();
    assert_eq!(view.unread_count, 1);
    assert_eq!(counters.snapshot().edits_reconciled, 1);
}

#[tokio::test(start_paused = true)]
async fn rejected_mark_read_is_rolled_back() {
    let (mut notes, _, counters) = feed(
        vec![],
        vec![note("abc123", false), note("x", false)],
        MockCommands {
            reject: true,
            ..Default::default()
        },
    );

    notes.start();
    let mut rx = notes.subscribe();
    rx.changed().await.unwrap();

    let err = notes.mark_read("abc123").await.unwrap_err();
    assert!(matches!(err, ActionError::Rejected(_)));

    let view = notes.snapshot().view.unwrap();
    assert_eq!(view.unread_count, 2);
    assert!(!view.items.iter().find(|n| n.id == "abc123").unwrap().read);
    assert_eq!(counters.snapshot().edits_rolled_back, 1);
}

#[tokio::test(start_paused = true)]
async fn mark_all_read_posts_once_and_clears_badge() {
    let (mut notes, commands, _) = feed(
        vec![],
        vec![note("a", false), note("b", true), note("c", false)],
        MockCommands::default(),
    );

    notes.start();
    let mut rx = notes.subscribe();
    rx.changed().await.unwrap();

    notes.mark_all_read().await.unwrap();

    assert_eq!(notes.snapshot().view.unwrap().badge(), None);
    let posted = commands.posted.lock();
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0].0, "/notifications/u1/read-all");
}

#[tokio::test]
async fn actions_need_an_active_feed() {
    let (notes, commands, _) = feed(vec![], vec![], MockCommands::default());

    let err = notes.mark_read("abc123").await.unwrap_err();
    assert!(matches!(err, ActionError::Inactive));
    assert!(commands.posted.lock().is_empty());
}
