
use std::sync::Arc;
use std::time::Duration;

use livesync::error::ActionError;
use livesync::metrics::Counters;
use livesync::resources::{ChatMessage, TradeChat};
use livesync::session::SessionContext;
use mock_fetcher::{FnFetcher, MockCommands};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::sleep;

const EVERY: Duration = Duration::from_secs(5);
const MS: Duration = Duration::from_millis(1);

fn server_msg(id: &str, client_id: Option<&str>, body: &str) -> ChatMessage {
    ChatMessage {
        id: id.into(),
        client_id: client_id.map(str::to_string),
        sender: "u1".into(),
        body: body.into(),
        sent_at: None,
        pending: false,
    }
}

/// Chat over a fake server whose message list the test controls.
fn chat(commands: MockCommands) -> (TradeChat, Arc<Mutex<Vec<ChatMessage>>>, Arc<MockCommands>, Counters) {
    let server = Arc::new(Mutex::new(vec![server_msg("m1", None, "welcome")]));
    let list = server.clone();
    let fetcher = FnFetcher::new(move |_| Ok(list.lock().clone()));

    let commands = Arc::new(commands);
    let counters = Counters::default();
    let chat = TradeChat::with_parts(
        fetcher,
        commands.clone(),
        SessionContext::new("u1"),
        EVERY,
        counters.clone(),
    );
    (chat, server, commands, counters)
}

#[tokio::test(start_paused = true)]
async fn sent_message_is_pending_until_echoed() {
    let (mut chat, server, commands, counters) = chat(MockCommands::default());
    chat.open("t1");
    let mut rx = chat.subscribe();
    rx.changed().await.unwrap();

    let client_id = chat.send("payment sent").await.unwrap();

    let view = chat.snapshot().view.unwrap();
    assert_eq!(view.messages.len(), 2);
    assert!(view.messages[1].pending);
    assert_eq!(view.pending, 1);

    {
        let posted = commands.posted.lock();
        assert_eq!(posted[0].0, "/chat/t1/messages");
        assert_eq!(posted[0].1["client_id"], client_id.as_str());
        assert_eq!(posted[0].1["message"], "payment sent");
    }

    // A poll that does not have it yet keeps the local copy.
    sleep(EVERY + MS).await;
    assert_eq!(chat.snapshot().view.unwrap().pending, 1);

    server
        .lock()
        .push(server_msg("m2", Some(&client_id), "payment sent"));
    sleep(EVERY).await;

    let view = chat.snapshot().view.unwrap();
    assert_eq!(view.messages.len(), 2);
    assert_eq!(view.pending, 0);
    assert_eq!(view.messages[1].id, "m2");
    assert!(!view.messages[1].pending);
    assert_eq!(counters.snapshot().edits_reconciled, 1);
}

#[tokio::test(start_paused = true)]
async fn rejected_message_is_removed() {
    let (mut chat, _, _, counters) = chat(MockCommands {
        reject: true,
        ..Default::default()
    });
    chat.open("t1");
    let mut rx = chat.subscribe();
    rx.changed().await.unwrap();

    let err = chat.send("hello?").await.unwrap_err();
    assert!(matches!(err, ActionError::Rejected(_)));

    let view = chat.snapshot().view.unwrap();
    assert_eq!(view.messages.len(), 1);
    assert_eq!(view.pending, 0);
    assert_eq!(counters.snapshot().edits_rolled_back, 1);
}

#[tokio::test(start_paused = true)]
async fn echo_under_server_id_only_replaces_local_copy() {
    let (mut chat, server, _, counters) = chat(MockCommands::default());
    chat.open("t1");
    let mut rx = chat.subscribe();
    rx.changed().await.unwrap();

    chat.send("see you").await.unwrap();
    server.lock().push(server_msg("m2", None, "see you"));

    sleep(EVERY * 3 + MS).await;

    let view = chat.snapshot().view.unwrap();
    assert_eq!(view.pending, 0);
    assert_eq!(
        view.messages.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
        ["m1", "m2"]
    );
    assert_eq!(counters.snapshot().edits_reconciled, 1);
}

#[tokio::test(start_paused = true)]
async fn late_rejection_of_settled_message_counts_no_rollback() {
    let gate = Arc::new(Notify::new());
    let (mut chat, server, _, counters) = chat(MockCommands {
        gate: Some(gate.clone()),
        reject: true,
        ..Default::default()
    });
    chat.open("t1");
    let mut rx = chat.subscribe();
    rx.changed().await.unwrap();

    let (res, ()) = tokio::join!(chat.send("done"), async {
        server.lock().push(server_msg("m2", None, "done"));
        sleep(EVERY + MS).await;
        assert_eq!(chat.snapshot().view.unwrap().pending, 0);
        gate.notify_one();
    });

    assert!(matches!(res, Err(ActionError::Rejected(_))));
    assert_eq!(counters.snapshot().edits_rolled_back, 0);
    assert_eq!(counters.snapshot().edits_reconciled, 1);
    assert_eq!(chat.snapshot().view.unwrap().messages.len(), 2);
}

#[tokio::test]
async fn send_without_open_trade_fails() {
    let (chat, _, commands, _) = chat(MockCommands::default());

    let err = chat.send("hello").await.unwrap_err();
    assert!(matches!(err, ActionError::Inactive));
    assert!(commands.posted.lock().is_empty());
}
