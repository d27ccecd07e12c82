use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::time::now_ms;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::config::SyncConfig;
use crate::error::ActionError;
use crate::fetcher::{
    CommandSender, Endpoint, EnvelopeFetcher, FetchParams, HttpClient, ResourceFetcher,
};
use crate::merge::{EditId, LiveCollection, Mergeable};
use crate::metrics::Counters;
use crate::resource::{ApplyReport, Snapshot, SyncState};
use crate::scheduler::Subscription;
use crate::session::SessionContext;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub read: bool,
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NotificationEdit {
    MarkRead,
}

impl Mergeable for Notification {
    type Key = String;
    type Edit = NotificationEdit;

    fn key(&self) -> String {
        self.id.clone()
    }

    fn apply(&mut self, edit: &NotificationEdit) {
        match edit {
            NotificationEdit::MarkRead => self.read = true,
        }
    }

    fn reflects(&self, edit: &NotificationEdit) -> bool {
        match edit {
            NotificationEdit::MarkRead => self.read,
        }
    }
}

/// What the bell icon and the notification list render.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NotificationsView {
    pub items: Vec<Notification>,
    /// Always derived from `items`.
    pub unread_count: usize,
}

impl NotificationsView {
    /// Badge number, hidden at zero.
    pub fn badge(&self) -> Option<usize> {
        (self.unread_count > 0).then_some(self.unread_count)
    }
}

#[derive(Debug, Default)]
pub struct NotificationFeed {
    items: LiveCollection<Notification>,
}

impl NotificationFeed {
    pub fn items(&self) -> &LiveCollection<Notification> {
        &self.items
    }

    pub fn unread_count(&self) -> usize {
        self.items.view().iter().filter(|n| !n.read).count()
    }
}

impl SyncState for NotificationFeed {
    type Payload = Vec<Notification>;
    type View = NotificationsView;

    fn apply_fresh(&mut self, payload: Vec<Notification>) -> ApplyReport {
        self.items.apply_fresh(payload)
    }

    fn view(&self) -> NotificationsView {
        NotificationsView {
            items: self.items.view().to_vec(),
            unread_count: self.unread_count(),
        }
    }
}

/// Live notification list of the signed-in user.
pub struct Notifications {
    sub: Subscription<NotificationFeed>,
    commands: Arc<dyn CommandSender>,
    session: SessionContext,
}

impl Notifications {
    pub fn new(
        client: HttpClient,
        session: SessionContext,
        cfg: &SyncConfig,
        counters: Counters,
    ) -> Self {
        let fetcher = Arc::new(EnvelopeFetcher::<Notification>::new(
            client.clone(),
            Endpoint::Notifications,
            "notifications",
        ));
        Self::with_parts(
            fetcher,
            Arc::new(client),
            session,
            cfg.notifications_every,
            counters,
        )
    }

    pub fn with_parts(
        fetcher: Arc<dyn ResourceFetcher<Vec<Notification>>>,
        commands: Arc<dyn CommandSender>,
        session: SessionContext,
        every: Duration,
        counters: Counters,
    ) -> Self {
        Self {
            sub: Subscription::new(Endpoint::Notifications, fetcher, every, counters),
            commands,
            session,
        }
    }

    /// Starts polling. Does nothing without a user id.
    pub fn start(&mut self) -> bool {
        if self.session.user_id().is_empty() {
            return false;
        }
        self.sub
            .activate(FetchParams::for_user(self.session.user_id()))
    }

    pub fn stop(&mut self) {
        self.sub.deactivate();
    }

    pub fn snapshot(&self) -> Snapshot<NotificationsView> {
        self.sub.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot<NotificationsView>> {
        self.sub.subscribe()
    }

    pub fn counters(&self) -> &Counters {
        self.sub.resource().counters()
    }

    /// Marks one notification read: locally at once, then on the server.
    ///
    /// The local state holds until a poll shows the server agrees. If the
    /// server rejects the request the local edit is rolled back.
    #[instrument(skip(self), fields(user_id = %self.session.user_id()))]
    pub async fn mark_read(&self, id: &str) -> Result<(), ActionError> {
        let edit = self
            .sub
            .resource()
            .edit(|feed| {
                feed.items
                    .apply_local(id.to_string(), NotificationEdit::MarkRead, now_ms())
            })
            .ok_or(ActionError::Inactive)?;

        let path = format!("/notifications/{id}/read");
        let res = self
            .commands
            .post(&path, json!({ "user_id": self.session.user_id() }))
            .await;

        self.settle(res, edit.into_iter().collect())
    }

    /// Marks every currently unread notification read.
    #[instrument(skip(self), fields(user_id = %self.session.user_id()))]
    pub async fn mark_all_read(&self) -> Result<(), ActionError> {
        let edits = self
            .sub
            .resource()
            .edit(|feed| {
                let unread: Vec<String> = feed
                    .items
                    .view()
                    .iter()
                    .filter(|n| !n.read)
                    .map(|n| n.id.clone())
                    .collect();
                let now = now_ms();
                unread
                    .into_iter()
                    .filter_map(|id| feed.items.apply_local(id, NotificationEdit::MarkRead, now))
                    .collect::<Vec<_>>()
            })
            .ok_or(ActionError::Inactive)?;

        if edits.is_empty() {
            return Ok(());
        }

        let path = format!("/notifications/{}/read-all", self.session.user_id());
        let res = self.commands.post(&path, json!({})).await;

        self.settle(res, edits)
    }

    fn settle<T>(&self, res: Result<T, ActionError>, edits: Vec<EditId>) -> Result<(), ActionError> {
        match res {
            Ok(_) => {
                info!(edits = edits.len(), "mark-read accepted");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, edits = edits.len(), "mark-read failed; rolling back");
                let rolled = self
                    .sub
                    .resource()
                    .edit(|feed| edits.iter().filter(|id| feed.items.rollback(**id)).count())
                    .unwrap_or(0);
                Counters::incr(&self.counters().edits_rolled_back, rolled as u64);
                Err(e)
            }
        }
    }
}
