use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use shared::{
    domain::{ChannelId, ChannelType, Cid, MemberRole, UserRole},
    protocol::{Channel, ChannelData, ChannelMembership, ChatUser, ContactResult, Message},
};

use crate::{
    config::SyncSettings, context::SessionContext, event_bus::EventBus, memory::InMemoryBackend,
};

pub fn user(id: &str, name: &str, role: UserRole) -> ChatUser {
    ChatUser::new(id, name, role)
}

/// Minutes after 2024-03-01 09:00 UTC.
pub fn at(minutes: i64) -> DateTime<Utc> {
    let base = Utc
        .with_ymd_and_hms(2024, 3, 1, 9, 0, 0)
        .single()
        .unwrap_or_default();
    base + Duration::minutes(minutes)
}

pub fn message(id: &str, author: &ChatUser, text: &str, created_at: DateTime<Utc>) -> Message {
    Message::new(id, author.clone(), text, created_at)
}

pub fn channel_data(id: &str, is_group: bool) -> ChannelData {
    ChannelData {
        id: ChannelId::new(id),
        channel_type: ChannelType::Messaging,
        name: String::new(),
        description: String::new(),
        is_group,
        image: None,
        last_message_at: None,
        created_at: None,
        updated_at: None,
        unavailable_for_actors: false,
    }
}

pub fn private_channel(id: &str, viewer: &ChatUser, companion: &ChatUser) -> Channel {
    let mut channel = Channel::new(Cid::messaging(id), channel_data(id, false));
    add_member(&mut channel, viewer, MemberRole::Member);
    add_member(&mut channel, companion, MemberRole::Member);
    channel
}

pub fn group_channel(id: &str, name: &str, members: &[&ChatUser]) -> Channel {
    let mut data = channel_data(id, true);
    data.name = name.to_string();
    let mut channel = Channel::new(Cid::messaging(id), data);
    for member in members {
        add_member(&mut channel, member, MemberRole::Member);
    }
    channel
}

pub fn add_member(channel: &mut Channel, user: &ChatUser, role: MemberRole) {
    channel
        .state
        .members
        .insert(user.id.clone(), ChannelMembership::new(user.clone(), role));
}

pub fn with_messages(mut channel: Channel, messages: Vec<Message>) -> Channel {
    channel.data.last_message_at = messages.last().map(|message| message.created_at);
    channel.state.messages = messages;
    channel
}

pub fn contact(actor_id: &str, user: &ChatUser) -> ContactResult {
    let (first, last) = user.name.split_once(' ').unwrap_or((user.name.as_str(), ""));
    ContactResult {
        actor_id: actor_id.to_string(),
        user_uuid: user.id.clone(),
        friendship_id: None,
        first_name: first.to_string(),
        last_name: last.to_string(),
        profile_picture_link: None,
        gender_pronoun: None,
    }
}

pub fn memory_context(viewer: &ChatUser) -> (Arc<InMemoryBackend>, SessionContext) {
    let bus = EventBus::new();
    let backend = Arc::new(InMemoryBackend::new(viewer.clone()).with_bus(bus.clone()));
    let settings = SyncSettings {
        mark_read_settle_delay_ms: 0,
        ..SyncSettings::default()
    };
    let ctx = SessionContext::new(viewer.clone(), backend.clone(), settings, bus);
    (backend, ctx)
}
