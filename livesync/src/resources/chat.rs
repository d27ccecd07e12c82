use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use common::time::now_ms;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::watch;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::error::ActionError;
use crate::fetcher::{
    CommandSender, Endpoint, EnvelopeFetcher, FetchParams, HttpClient, ResourceFetcher,
};
use crate::merge::{LiveCollection, Mergeable};
use crate::metrics::Counters;
use crate::resource::{ApplyReport, Snapshot, SyncState};
use crate::scheduler::Subscription;
use crate::session::SessionContext;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(alias = "_id")]
    pub id: String,
    /// Id chosen by the sender before the server assigned `id`.
    #[serde(default, alias = "clientId")]
    pub client_id: Option<String>,
    #[serde(default, alias = "sender_id")]
    pub sender: String,
    #[serde(alias = "message")]
    pub body: String,
    #[serde(default, alias = "createdAt")]
    pub sent_at: Option<DateTime<Utc>>,
    /// Shown locally, not yet returned by the server.
    #[serde(skip)]
    pub pending: bool,
}

const ECHO_CLOCK_SKEW_MS: i64 = 60_000;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatEdit {
    Send {
        sender: String,
        body: String,
        sent_at_ms: u64,
    },
}

impl Mergeable for ChatMessage {
    type Key = String;
    type Edit = ChatEdit;

    fn key(&self) -> String {
        self.client_id.clone().unwrap_or_else(|| self.id.clone())
    }

    fn apply(&mut self, _edit: &ChatEdit) {}

    fn reflects(&self, edit: &ChatEdit) -> bool {
        match edit {
            ChatEdit::Send { .. } => !self.pending,
        }
    }

    /// A server message without a `client_id` settles a pending send when
    /// sender and body match and it was not stamped before the send (minus
    /// clock skew between client and server).
    fn echoes(&self, edit: &ChatEdit) -> bool {
        match edit {
            ChatEdit::Send {
                sender,
                body,
                sent_at_ms,
            } => {
                self.client_id.is_none()
                    && !self.pending
                    && &self.sender == sender
                    && &self.body == body
                    && self.sent_at.is_none_or(|at| {
                        at.timestamp_millis() + ECHO_CLOCK_SKEW_MS >= *sent_at_ms as i64
                    })
            }
        }
    }

    fn materialize(key: &String, edit: &ChatEdit) -> Option<Self> {
        match edit {
            ChatEdit::Send {
                sender,
                body,
                sent_at_ms,
            } => Some(ChatMessage {
                id: key.clone(),
                client_id: Some(key.clone()),
                sender: sender.clone(),
                body: body.clone(),
                sent_at: Utc.timestamp_millis_opt(*sent_at_ms as i64).single(),
                pending: true,
            }),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChatView {
    /// Server messages in server order, then unconfirmed local ones.
    pub messages: Vec<ChatMessage>,
    pub pending: usize,
}

#[derive(Debug, Default)]
pub struct ChatThread {
    messages: LiveCollection<ChatMessage>,
}

impl ChatThread {
    pub fn messages(&self) -> &LiveCollection<ChatMessage> {
        &self.messages
    }
}

impl SyncState for ChatThread {
    type Payload = Vec<ChatMessage>;
    type View = ChatView;

    fn apply_fresh(&mut self, payload: Vec<ChatMessage>) -> ApplyReport {
        self.messages.apply_fresh(payload)
    }

    fn view(&self) -> ChatView {
        ChatView {
            messages: self.messages.view().to_vec(),
            pending: self.messages.pending().len(),
        }
    }
}

/// Support / trade chat. Polls the messages of one trade at a time.
pub struct TradeChat {
    sub: Subscription<ChatThread>,
    commands: Arc<dyn CommandSender>,
    session: SessionContext,
}

impl TradeChat {
    pub fn new(
        client: HttpClient,
        session: SessionContext,
        cfg: &SyncConfig,
        counters: Counters,
    ) -> Self {
        let fetcher = Arc::new(EnvelopeFetcher::<ChatMessage>::new(
            client.clone(),
            Endpoint::ChatMessages,
            "messages",
        ));
        Self::with_parts(fetcher, Arc::new(client), session, cfg.chat_every, counters)
    }

    pub fn with_parts(
        fetcher: Arc<dyn ResourceFetcher<Vec<ChatMessage>>>,
        commands: Arc<dyn CommandSender>,
        session: SessionContext,
        every: Duration,
        counters: Counters,
    ) -> Self {
        Self {
            sub: Subscription::new(Endpoint::ChatMessages, fetcher, every, counters),
            commands,
            session,
        }
    }

    /// Switches the chat to `trade_id`; the previous trade's poller is
    /// stopped first and its messages are not carried over.
    pub fn open(&mut self, trade_id: &str) -> bool {
        if trade_id.is_empty() {
            self.sub.deactivate();
            return false;
        }
        self.sub.activate(FetchParams::for_trade(trade_id))
    }

    pub fn close(&mut self) {
        self.sub.deactivate();
    }

    pub fn trade_id(&self) -> Option<&str> {
        self.sub.key().map(|k| k.subject.as_str())
    }

    pub fn snapshot(&self) -> Snapshot<ChatView> {
        self.sub.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot<ChatView>> {
        self.sub.subscribe()
    }

    pub fn counters(&self) -> &Counters {
        self.sub.resource().counters()
    }

    /// Appends the message locally, then posts it. The local copy is
    /// replaced by the server's once a poll returns the same `client_id`.
    #[instrument(skip(self, body), fields(user_id = %self.session.user_id()))]
    pub async fn send(&self, body: &str) -> Result<String, ActionError> {
        let trade_id = self.trade_id().ok_or(ActionError::Inactive)?.to_string();
        let client_id = Uuid::new_v4().to_string();
        let edit = ChatEdit::Send {
            sender: self.session.user_id().to_string(),
            body: body.to_string(),
            sent_at_ms: now_ms(),
        };

        let edit_id = self
            .sub
            .resource()
            .edit(|t| t.messages.apply_local(client_id.clone(), edit, now_ms()))
            .flatten()
            .ok_or(ActionError::Inactive)?;

        let res = self
            .commands
            .post(
                &format!("/chat/{trade_id}/messages"),
                json!({
                    "client_id": client_id,
                    "sender_id": self.session.user_id(),
                    "message": body,
                }),
            )
            .await;

        match res {
            Ok(_) => {
                info!(trade_id = %trade_id, client_id = %client_id, "message sent");
                Ok(client_id)
            }
            Err(e) => {
                warn!(error = %e, trade_id = %trade_id, "send failed; removing local message");
                let rolled = self
                    .sub
                    .resource()
                    .edit(|t| t.messages.rollback(edit_id));
                if rolled == Some(true) {
                    Counters::incr(&self.counters().edits_rolled_back, 1);
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn send_edit(body: &str) -> ChatEdit {
        ChatEdit::Send {
            sender: "u1".into(),
            body: body.into(),
            sent_at_ms: 1_700_000_000_000,
        }
    }

    #[test]
    fn local_message_is_appended_until_echoed() {
        let mut t = ChatThread::default();
        t.apply_fresh(vec![server_msg("m1", None, "hello")]);

        t.messages
            .apply_local("c-1".into(), send_edit("are you there?"), 1)
            .unwrap();

        let v = t.view();
        assert_eq!(v.messages.len(), 2);
        assert!(v.messages[1].pending);
        assert_eq!(v.pending, 1);

        // Poll that does not have it yet.
        t.apply_fresh(vec![server_msg("m1", None, "hello")]);
        assert_eq!(t.view().messages.len(), 2);

        // Server echoes it back with its own id.
        let report = t.apply_fresh(vec![
            server_msg("m1", None, "hello"),
            server_msg("m2", Some("c-1"), "are you there?"),
        ]);
        assert_eq!(report.reconciled, 1);

        let v = t.view();
        assert_eq!(v.messages.len(), 2);
        assert_eq!(v.messages[1].id, "m2");
        assert!(!v.messages[1].pending);
        assert_eq!(v.pending, 0);
    }

    #[test]
    fn echo_without_client_id_settles_the_send() {
        let mut t = ChatThread::default();
        t.apply_fresh(vec![]);
        t.messages.apply_local("c-1".into(), send_edit("hi"), 1).unwrap();

        let echo = server_msg("m1", None, "hi");
        let report = t.apply_fresh(vec![echo.clone()]);
        assert_eq!(report.reconciled, 1);

        for _ in 0..4 {
            t.apply_fresh(vec![echo.clone()]);
        }
        let v = t.view();
        assert_eq!(v.messages, vec![echo]);
        assert_eq!(v.pending, 0);
        assert!(t.messages().pending().is_empty());
    }

    #[test]
    fn earlier_identical_message_is_not_taken_for_the_echo() {
        let mut t = ChatThread::default();
        t.apply_fresh(vec![server_msg("m1", None, "ok")]);
        t.messages.apply_local("c-1".into(), send_edit("ok"), 1).unwrap();

        // Only the message that was already there.
        t.apply_fresh(vec![server_msg("m1", None, "ok")]);
        assert_eq!(t.view().pending, 1);
        assert_eq!(t.view().messages.len(), 2);

        let report = t.apply_fresh(vec![
            server_msg("m1", None, "ok"),
            server_msg("m2", None, "ok"),
        ]);
        assert_eq!(report.reconciled, 1);
        let v = t.view();
        assert_eq!(v.pending, 0);
        assert_eq!(
            v.messages.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
            ["m1", "m2"]
        );
    }

    #[test]
    fn stamp_long_before_the_send_is_not_an_echo() {
        let mut old = server_msg("m9", None, "hi");
        old.sent_at = Utc.timestamp_millis_opt(1_600_000_000_000).single();
        assert!(!old.echoes(&send_edit("hi")));

        let mut fresh = server_msg("m9", None, "hi");
        fresh.sent_at = Utc.timestamp_millis_opt(1_700_000_000_500).single();
        assert!(fresh.echoes(&send_edit("hi")));
        assert!(!fresh.echoes(&send_edit("hello")));
    }

    #[test]
    fn decodes_backend_message() {
        let m: ChatMessage = serde_json::from_value(json!({
            "_id": "m7",
            "sender_id": "support",
            "message": "We are looking into it",
            "createdAt": "2024-05-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(m.key(), "m7");
        assert_eq!(m.sender, "support");
        assert!(!m.pending);
    }
}
