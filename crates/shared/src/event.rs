use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ChannelId, ChannelType, Cid};
use crate::protocol::{timestamp, Channel, ChannelMembership, ChatUser, Message};

/// Push event types. Unrecognised names are kept so they can still be routed
/// to catch-all subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    MessageNew,
    MessageUpdated,
    MessageDeleted,
    NotificationMessageNew,
    NotificationAddedToChannel,
    NotificationRemovedFromChannel,
    NotificationMarkRead,
    ChannelUpdated,
    ChannelDeleted,
    MemberAdded,
    MemberUpdated,
    MemberRemoved,
    UserPresenceChanged,
    TypingStart,
    TypingStop,
    HealthCheck,
    Unknown(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::MessageNew => "message.new",
            EventKind::MessageUpdated => "message.updated",
            EventKind::MessageDeleted => "message.deleted",
            EventKind::NotificationMessageNew => "notification.message_new",
            EventKind::NotificationAddedToChannel => "notification.added_to_channel",
            EventKind::NotificationRemovedFromChannel => "notification.removed_from_channel",
            EventKind::NotificationMarkRead => "notification.mark_read",
            EventKind::ChannelUpdated => "channel.updated",
            EventKind::ChannelDeleted => "channel.deleted",
            EventKind::MemberAdded => "member.added",
            EventKind::MemberUpdated => "member.updated",
            EventKind::MemberRemoved => "member.removed",
            EventKind::UserPresenceChanged => "user.presence.changed",
            EventKind::TypingStart => "typing.start",
            EventKind::TypingStop => "typing.stop",
            EventKind::HealthCheck => "health.check",
            EventKind::Unknown(name) => name,
        }
    }
}

impl From<String> for EventKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "message.new" => EventKind::MessageNew,
            "message.updated" => EventKind::MessageUpdated,
            "message.deleted" => EventKind::MessageDeleted,
            "notification.message_new" => EventKind::NotificationMessageNew,
            "notification.added_to_channel" => EventKind::NotificationAddedToChannel,
            "notification.removed_from_channel" => EventKind::NotificationRemovedFromChannel,
            "notification.mark_read" => EventKind::NotificationMarkRead,
            "channel.updated" => EventKind::ChannelUpdated,
            "channel.deleted" => EventKind::ChannelDeleted,
            "member.added" => EventKind::MemberAdded,
            "member.updated" => EventKind::MemberUpdated,
            "member.removed" => EventKind::MemberRemoved,
            "user.presence.changed" => EventKind::UserPresenceChanged,
            "typing.start" => EventKind::TypingStart,
            "typing.stop" => EventKind::TypingStop,
            "health.check" => EventKind::HealthCheck,
            _ => EventKind::Unknown(value),
        }
    }
}

impl From<EventKind> for String {
    fn from(value: EventKind) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<Cid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<ChannelId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_type: Option<ChannelType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<Box<Channel>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member: Option<ChannelMembership>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<ChatUser>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unread_channels: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unread_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_unread_count: Option<u32>,
    #[serde(
        default,
        deserialize_with = "timestamp::deserialize_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

impl ChatEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            cid: None,
            channel_id: None,
            channel_type: None,
            channel: None,
            message: None,
            member: None,
            user: None,
            unread_channels: None,
            unread_count: None,
            total_unread_count: None,
            created_at: None,
        }
    }

    pub fn for_channel(kind: EventKind, cid: Cid) -> Self {
        let mut event = Self::new(kind);
        event.channel_id = Some(cid.id.clone());
        event.channel_type = Some(cid.channel_type);
        event.cid = Some(cid);
        event
    }

    pub fn with_message(mut self, message: Message) -> Self {
        self.message = Some(message);
        self
    }

    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channel = Some(Box::new(channel));
        self
    }

    pub fn with_member(mut self, member: ChannelMembership) -> Self {
        self.member = Some(member);
        self
    }

    pub fn with_user(mut self, user: ChatUser) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_unread_channels(mut self, unread_channels: u32) -> Self {
        self.unread_channels = Some(unread_channels);
        self
    }

    pub fn target_cid(&self) -> Option<Cid> {
        if let Some(cid) = &self.cid {
            return Some(cid.clone());
        }
        if let Some(channel) = &self.channel {
            return Some(channel.cid.clone());
        }
        self.channel_id
            .as_ref()
            .map(|id| Cid::new(self.channel_type.unwrap_or_default(), id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kinds_use_dotted_names() {
        let event: ChatEvent =
            serde_json::from_str(r#"{"type":"notification.mark_read","cid":"messaging:c1"}"#)
                .expect("decode");
        assert_eq!(event.kind, EventKind::NotificationMarkRead);
        assert_eq!(event.target_cid(), Some(Cid::messaging("c1")));
    }

    #[test]
    fn unknown_kinds_are_preserved() {
        let event: ChatEvent =
            serde_json::from_str(r#"{"type":"reaction.new"}"#).expect("decode");
        assert_eq!(event.kind, EventKind::Unknown("reaction.new".to_string()));
        assert_eq!(
            serde_json::to_value(&event).expect("encode")["type"],
            "reaction.new"
        );
    }

    #[test]
    fn target_cid_falls_back_to_channel_id() {
        let event: ChatEvent =
            serde_json::from_str(r#"{"type":"channel.deleted","channel_id":"c9"}"#)
                .expect("decode");
        assert_eq!(event.target_cid(), Some(Cid::messaging("c9")));
    }
}
