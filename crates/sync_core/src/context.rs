use std::sync::Arc;

use serde_json::json;
use shared::{
    domain::Cid,
    protocol::{ChatUser, ContactResult},
};
use tokio::sync::broadcast;
use tracing::warn;

use crate::{
    analytics::{AnalyticsEvent, AnalyticsSink, ChatType, TracingAnalytics},
    backend::{ContactDirectory, MessagingBackend, MissingContactDirectory},
    config::SyncSettings,
    event_bus::EventBus,
    notice::Notice,
    scroll::ScrollAction,
    upload::Uploader,
};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    DirectoryChanged,
    ActiveChannelChanged(Option<Cid>),
    DraftOpened(ContactResult),
    TimelineChanged(Cid),
    UnreadBadgeChanged(bool),
    Scroll(ScrollAction),
    SearchChanged,
    Notice(Notice),
}

pub struct SessionContext {
    user: ChatUser,
    is_minor: bool,
    pub backend: Arc<dyn MessagingBackend>,
    pub contacts: Arc<dyn ContactDirectory>,
    pub analytics: Arc<dyn AnalyticsSink>,
    pub settings: SyncSettings,
    pub bus: EventBus,
    pub uploader: Uploader,
    output: broadcast::Sender<SessionEvent>,
}

impl SessionContext {
    pub fn new(
        user: ChatUser,
        backend: Arc<dyn MessagingBackend>,
        settings: SyncSettings,
        bus: EventBus,
    ) -> Self {
        let (output, _) = broadcast::channel(settings.output_channel_capacity.max(1));
        Self {
            user,
            is_minor: false,
            uploader: Uploader::new(backend.clone()),
            backend,
            contacts: Arc::new(MissingContactDirectory),
            analytics: Arc::new(TracingAnalytics),
            settings,
            bus,
            output,
        }
    }

    pub fn with_contacts(mut self, contacts: Arc<dyn ContactDirectory>) -> Self {
        self.contacts = contacts;
        self
    }

    pub fn with_analytics(mut self, analytics: Arc<dyn AnalyticsSink>) -> Self {
        self.analytics = analytics;
        self
    }

    pub fn with_minor(mut self, is_minor: bool) -> Self {
        self.is_minor = is_minor;
        self
    }

    pub fn user(&self) -> &ChatUser {
        &self.user
    }

    pub(crate) fn set_user(&mut self, user: ChatUser) {
        self.user = user;
    }

    pub fn is_minor(&self) -> bool {
        self.is_minor
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.output.subscribe()
    }

    pub fn emit(&self, event: SessionEvent) {
        let _ = self.output.send(event);
    }

    pub fn notify(&self, notice: Notice) {
        warn!(
            context = ?notice.context(),
            category = ?notice.category(),
            message = notice.message(),
            "session: notice raised"
        );
        self.emit(SessionEvent::Notice(notice));
    }

    pub fn record(
        &self,
        event: AnalyticsEvent,
        cid: &Cid,
        user_key: &str,
        chat_type: Option<ChatType>,
    ) {
        let mut payload = json!({ "channelId": cid.id });
        payload[user_key] = json!(self.user.id);
        if let Some(chat_type) = chat_type {
            payload["type"] = json!(chat_type);
        }
        self.analytics.record_event(event, payload);
    }
}
