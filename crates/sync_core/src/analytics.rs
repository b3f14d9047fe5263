use serde::Serialize;
use serde_json::Value;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalyticsEvent {
    ChatMessageSent,
    ChatCreated,
    ChatLeft,
}

impl AnalyticsEvent {
    pub fn key(&self) -> &'static str {
        match self {
            AnalyticsEvent::ChatMessageSent => "CHAT_MESSAGE_SENT",
            AnalyticsEvent::ChatCreated => "CHAT_CREATED",
            AnalyticsEvent::ChatLeft => "CHAT_LEFT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    Group,
    Private,
}

impl ChatType {
    pub fn of(is_group: bool) -> Self {
        if is_group {
            ChatType::Group
        } else {
            ChatType::Private
        }
    }
}

pub trait AnalyticsSink: Send + Sync {
    fn record_event(&self, event: AnalyticsEvent, payload: Value);
}

pub struct TracingAnalytics;

impl AnalyticsSink for TracingAnalytics {
    fn record_event(&self, event: AnalyticsEvent, payload: Value) {
        info!(key = event.key(), %payload, "analytics: event recorded");
    }
}
