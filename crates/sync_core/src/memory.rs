use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Mutex, MutexGuard, PoisonError},
};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use shared::{
    domain::{ChannelId, ChannelType, Cid, MemberRole, MessageId, UserId, UserRole},
    error::{ApiError, ErrorCode},
    event::{ChatEvent, EventKind},
    protocol::{
        Channel, ChannelData, ChannelMembership, ChannelPatch, ChatUser, ContactResult,
        CreateChannelData, FileUpload, FileUploadResponse, Message, MessagePatch,
        SendMessageRequest, UserPatch,
    },
    query::{ChannelFilters, ChannelOptions, ChannelSort, MessagePagination, OneOrMany, QueryFilter, SortDirection},
};
use tracing::debug;

use crate::{
    analytics::{AnalyticsEvent, AnalyticsSink},
    backend::{ContactDirectory, MessagingBackend},
    event_bus::EventBus,
    search::name_matches,
};

const DEFAULT_MESSAGE_WINDOW: usize = 20;

#[derive(Default)]
struct MemoryState {
    users: BTreeMap<UserId, ChatUser>,
    channels: Vec<Channel>,
    calls: Vec<String>,
    failing: BTreeSet<String>,
    next_id: u64,
}

impl MemoryState {
    fn channel(&self, cid: &Cid) -> Result<&Channel> {
        self.channels
            .iter()
            .find(|channel| &channel.cid == cid)
            .ok_or_else(|| not_found(format!("channel {cid}")))
    }

    fn channel_mut(&mut self, cid: &Cid) -> Result<&mut Channel> {
        self.channels
            .iter_mut()
            .find(|channel| &channel.cid == cid)
            .ok_or_else(|| not_found(format!("channel {cid}")))
    }

    fn locate_message(&mut self, id: &MessageId) -> Result<(usize, usize)> {
        self.channels
            .iter()
            .enumerate()
            .find_map(|(ci, channel)| {
                channel
                    .state
                    .messages
                    .iter()
                    .position(|message| &message.id == id)
                    .map(|mi| (ci, mi))
            })
            .ok_or_else(|| not_found(format!("message {id}")))
    }

    fn user(&self, id: &UserId) -> ChatUser {
        self.users
            .get(id)
            .cloned()
            .unwrap_or_else(|| ChatUser::new(id.as_str(), id.as_str(), UserRole::User))
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn unread_channels(&self, viewer: &UserId) -> u32 {
        self.channels
            .iter()
            .filter(|channel| channel.state.members.contains_key(viewer))
            .filter(|channel| channel.state.unread_count > 0)
            .count() as u32
    }
}

pub struct InMemoryBackend {
    viewer: UserId,
    state: Mutex<MemoryState>,
    bus: Option<EventBus>,
}

impl InMemoryBackend {
    pub fn new(viewer: ChatUser) -> Self {
        let mut state = MemoryState::default();
        let id = viewer.id.clone();
        state.users.insert(id.clone(), viewer);
        Self {
            viewer: id,
            state: Mutex::new(state),
            bus: None,
        }
    }

    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_user(&self, user: ChatUser) {
        self.lock().users.insert(user.id.clone(), user);
    }

    pub fn insert_channel(&self, channel: Channel) {
        let mut state = self.lock();
        for member in channel.state.members.values() {
            state
                .users
                .entry(member.user.id.clone())
                .or_insert_with(|| member.user.clone());
        }
        state.channels.retain(|known| known.cid != channel.cid);
        state.channels.push(channel);
    }

    pub fn set_unread(&self, cid: &Cid, count: u32) {
        if let Ok(channel) = self.lock().channel_mut(cid) {
            channel.state.unread_count = count;
        }
    }

    pub fn fail(&self, operation: &str) {
        self.lock().failing.insert(operation.to_string());
    }

    pub fn recover(&self, operation: &str) {
        self.lock().failing.remove(operation);
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn calls_named(&self, operation: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.split(' ').next() == Some(operation))
            .count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn channel(&self, cid: &Cid) -> Option<Channel> {
        self.lock().channel(cid).ok().cloned()
    }

    pub fn channel_ids(&self) -> Vec<Cid> {
        self.lock().channels.iter().map(|c| c.cid.clone()).collect()
    }

    pub fn user(&self, id: &UserId) -> Option<ChatUser> {
        self.lock().users.get(id).cloned()
    }

    pub fn receive(&self, cid: &Cid, message: Message) {
        let event = {
            let mut state = self.lock();
            let viewer = self.viewer.clone();
            let Ok(channel) = state.channel_mut(cid) else {
                return;
            };
            if message.user.id != viewer {
                channel.state.unread_count += 1;
            }
            channel.data.last_message_at = Some(message.created_at);
            channel.state.messages.push(message.clone());
            let unread_count = channel.state.unread_count;
            let unread_channels = state.unread_channels(&viewer);
            let mut event = ChatEvent::for_channel(EventKind::MessageNew, cid.clone())
                .with_message(message)
                .with_unread_channels(unread_channels);
            event.unread_count = Some(unread_count);
            event
        };
        self.publish(event);
    }

    pub fn publish(&self, event: ChatEvent) {
        if let Some(bus) = &self.bus {
            let delivered = bus.publish(&event);
            debug!(kind = %event.kind, delivered, "memory: event echoed");
        }
    }

    fn begin(&self, call: String) -> Result<MutexGuard<'_, MemoryState>> {
        let mut state = self.lock();
        let operation = call.split(' ').next().unwrap_or_default().to_string();
        state.calls.push(call);
        if state.failing.contains(&operation) {
            return Err(ApiError::new(ErrorCode::Internal, format!("{operation} failed")).into());
        }
        Ok(state)
    }

    fn viewer_user(&self, state: &MemoryState) -> ChatUser {
        state.user(&self.viewer)
    }
}

fn not_found(what: String) -> anyhow::Error {
    ApiError::new(ErrorCode::NotFound, format!("{what} not found")).into()
}

fn window(channel: &Channel, limit: usize) -> Channel {
    let mut copy = channel.clone();
    let skip = copy.state.messages.len().saturating_sub(limit);
    copy.state.messages.drain(..skip);
    copy
}

fn matches_eq<T: PartialEq>(filter: &QueryFilter<T>, value: &T) -> bool {
    filter.eq.as_ref().map_or(true, |eq| eq.contains(value))
        && filter.ne.as_ref().map_or(true, |ne| ne != value)
        && filter.any_of.as_ref().map_or(true, |any| any.contains(value))
        && filter.none_of.as_ref().map_or(true, |none| !none.contains(value))
}

fn matches_ord<T: PartialOrd>(filter: &QueryFilter<T>, value: &T) -> bool {
    matches_eq(filter, value)
        && filter.gt.as_ref().map_or(true, |gt| value > gt)
        && filter.gte.as_ref().map_or(true, |gte| value >= gte)
        && filter.lt.as_ref().map_or(true, |lt| value < lt)
        && filter.lte.as_ref().map_or(true, |lte| value <= lte)
}

fn matches_text(filter: &QueryFilter<String>, value: &str) -> bool {
    matches_ord(filter, &value.to_string())
        && filter
            .autocomplete
            .as_deref()
            .map_or(true, |text| name_matches(value, text))
}

fn matches_members(filter: &QueryFilter<UserId>, channel: &Channel) -> bool {
    let members: BTreeSet<&UserId> = channel.state.members.keys().collect();
    let eq = match &filter.eq {
        None => true,
        Some(OneOrMany::One(id)) => members.contains(id),
        Some(OneOrMany::Many(ids)) => ids.iter().collect::<BTreeSet<_>>() == members,
    };
    eq && filter
        .any_of
        .as_ref()
        .map_or(true, |ids| ids.iter().any(|id| members.contains(id)))
        && filter
            .none_of
            .as_ref()
            .map_or(true, |ids| !ids.iter().any(|id| members.contains(id)))
        && filter.exists.map_or(true, |flag| flag == !members.is_empty())
}

pub fn matches_filters(filters: &ChannelFilters, channel: &Channel) -> bool {
    filters.id.as_ref().map_or(true, |f| matches_ord(f, &channel.id))
        && filters
            .channel_type
            .as_ref()
            .map_or(true, |f| matches_eq(f, &channel.data.channel_type))
        && filters
            .members
            .as_ref()
            .map_or(true, |f| matches_members(f, channel))
        && filters
            .name
            .as_ref()
            .map_or(true, |f| matches_text(f, &channel.data.name))
        && filters
            .is_group
            .as_ref()
            // Private channels carry no group flag at all, so `exists` tests the flag itself.
            .map_or(true, |f| {
                matches_eq(f, &channel.data.is_group)
                    && f.exists.map_or(true, |flag| flag == channel.data.is_group)
            })
        && filters.member_name.as_ref().map_or(true, |f| {
            channel
                .state
                .members
                .values()
                .any(|member| matches_text(f, &member.user.name))
        })
        && filters
            .member_count
            .as_ref()
            .map_or(true, |f| matches_ord(f, &(channel.member_count() as u32)))
}

fn set_role(channel: &mut Channel, user_id: &UserId, role: MemberRole) -> Option<ChannelMembership> {
    let member = channel.state.members.get_mut(user_id)?;
    member.channel_role = role;
    member.is_moderator = role == MemberRole::Moderator;
    Some(member.clone())
}

#[async_trait]
impl MessagingBackend for InMemoryBackend {
    async fn current_user(&self) -> Result<ChatUser> {
        let state = self.begin("current_user".to_string())?;
        Ok(self.viewer_user(&state))
    }

    async fn partial_update_user(&self, user_id: &UserId, set: UserPatch) -> Result<ChatUser> {
        let mut state = self.begin(format!("partial_update_user {user_id}"))?;
        let mut user = state.user(user_id);
        if let Some(name) = set.name {
            user.name = name;
        }
        if let Some(image) = set.image {
            user.image = Some(image);
        }
        if let Some(role) = set.role {
            user.role = role;
        }
        if let Some(custom_id) = set.custom_id {
            user.custom_id = Some(custom_id);
        }
        if let Some(pronoun) = set.custom_gender_pronoun {
            user.custom_gender_pronoun = Some(pronoun);
        }
        state.users.insert(user_id.clone(), user.clone());
        Ok(user)
    }

    async fn query_channels(
        &self,
        filters: &ChannelFilters,
        sort: &ChannelSort,
        options: &ChannelOptions,
    ) -> Result<Vec<Channel>> {
        let state = self.begin(format!(
            "query_channels offset={} limit={}",
            options.offset, options.limit
        ))?;
        let mut found: Vec<&Channel> = state
            .channels
            .iter()
            .filter(|channel| matches_filters(filters, channel))
            .collect();
        // Stable sort keeps insertion order among equal timestamps.
        if let Some(direction) = sort.last_message_at {
            found.sort_by(|a, b| {
                let ordering = a.data.last_message_at.cmp(&b.data.last_message_at);
                match direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                }
            });
        }
        let limit = options
            .message_limit
            .map_or(DEFAULT_MESSAGE_WINDOW, |limit| limit as usize);
        Ok(found
            .into_iter()
            .skip(options.offset as usize)
            .take(options.limit as usize)
            .map(|channel| window(channel, limit))
            .collect())
    }

    async fn create_channel(
        &self,
        channel_type: ChannelType,
        id: Option<ChannelId>,
        data: CreateChannelData,
    ) -> Result<Channel> {
        let (channel, created) = {
            let mut state = self.begin(format!("create_channel {}", channel_type.as_str()))?;
            let id = id.unwrap_or_else(|| {
                let mut members: Vec<&str> = data.members.iter().map(UserId::as_str).collect();
                members.sort_unstable();
                members.dedup();
                ChannelId::new(format!("!members-{}", members.join("-")))
            });
            let cid = Cid::new(channel_type, id.clone());
            if let Ok(existing) = state.channel(&cid) {
                (window(existing, DEFAULT_MESSAGE_WINDOW), false)
            } else {
                let now = Utc::now();
                let mut channel = Channel::new(
                    cid,
                    ChannelData {
                        id,
                        channel_type,
                        name: data.name.unwrap_or_default(),
                        description: data.description.unwrap_or_default(),
                        is_group: data.is_group.unwrap_or(false),
                        image: data.image,
                        last_message_at: None,
                        created_at: Some(now),
                        updated_at: Some(now),
                        unavailable_for_actors: data.unavailable_for_actors.unwrap_or(false),
                    },
                );
                for member in &data.members {
                    let user = state.user(member);
                    channel
                        .state
                        .members
                        .insert(member.clone(), ChannelMembership::new(user, MemberRole::Member));
                }
                state.channels.push(channel.clone());
                (channel, true)
            }
        };
        if created && channel.state.members.contains_key(&self.viewer) {
            self.publish(
                ChatEvent::for_channel(EventKind::NotificationAddedToChannel, channel.cid.clone())
                    .with_channel(channel.clone()),
            );
        }
        Ok(channel)
    }

    async fn watch_channel(&self, cid: &Cid) -> Result<Channel> {
        let state = self.begin(format!("watch_channel {cid}"))?;
        Ok(window(state.channel(cid)?, DEFAULT_MESSAGE_WINDOW))
    }

    async fn query_messages(
        &self,
        cid: &Cid,
        pagination: &MessagePagination,
    ) -> Result<Vec<Message>> {
        let state = self.begin(format!("query_messages {cid}"))?;
        let messages = &state.channel(cid)?.state.messages;
        let end = pagination
            .id_lt
            .as_ref()
            .and_then(|id| messages.iter().position(|message| &message.id == id))
            .unwrap_or(messages.len());
        let start = end.saturating_sub(pagination.limit as usize);
        Ok(messages[start..end].to_vec())
    }

    async fn send_message(&self, cid: &Cid, request: SendMessageRequest) -> Result<Message> {
        let event = {
            let mut state = self.begin(format!("send_message {cid}"))?;
            let id = match request.id {
                Some(id) => id,
                None => MessageId::new(state.next_id("msg")),
            };
            let mut message = Message::new(
                id.as_str(),
                self.viewer_user(&state),
                request.text,
                Utc::now(),
            );
            message.attachments = request.attachments;
            message.custom_type = request.custom_type;
            let channel = state.channel_mut(cid)?;
            channel.data.last_message_at = Some(message.created_at);
            channel.state.messages.push(message.clone());
            ChatEvent::for_channel(EventKind::MessageNew, cid.clone()).with_message(message)
        };
        let message = event.message.clone();
        self.publish(event);
        message.ok_or_else(|| not_found(format!("message in {cid}")))
    }

    async fn send_file(&self, cid: &Cid, file: &FileUpload) -> Result<FileUploadResponse> {
        drop(self.begin(format!("send_file {cid} {}", file.filename))?);
        Ok(FileUploadResponse {
            file: format!("https://files.local/{}/{}", cid.id, file.filename),
        })
    }

    async fn send_image(&self, cid: &Cid, file: &FileUpload) -> Result<FileUploadResponse> {
        drop(self.begin(format!("send_image {cid} {}", file.filename))?);
        Ok(FileUploadResponse {
            file: format!("https://images.local/{}/{}", cid.id, file.filename),
        })
    }

    async fn delete_file(&self, cid: &Cid, url: &str) -> Result<()> {
        drop(self.begin(format!("delete_file {cid} {url}"))?);
        Ok(())
    }

    async fn delete_image(&self, cid: &Cid, url: &str) -> Result<()> {
        drop(self.begin(format!("delete_image {cid} {url}"))?);
        Ok(())
    }

    async fn update_channel_partial(&self, cid: &Cid, set: ChannelPatch) -> Result<Channel> {
        let channel = {
            let mut state = self.begin(format!("update_channel_partial {cid}"))?;
            let channel = state.channel_mut(cid)?;
            set.apply_to(&mut channel.data);
            channel.data.updated_at = Some(Utc::now());
            window(channel, DEFAULT_MESSAGE_WINDOW)
        };
        self.publish(
            ChatEvent::for_channel(EventKind::ChannelUpdated, cid.clone()).with_channel(channel.clone()),
        );
        Ok(channel)
    }

    async fn delete_channel(&self, cid: &Cid) -> Result<()> {
        {
            let mut state = self.begin(format!("delete_channel {cid}"))?;
            state.channel(cid)?;
            state.channels.retain(|channel| &channel.cid != cid);
        }
        self.publish(ChatEvent::for_channel(EventKind::ChannelDeleted, cid.clone()));
        Ok(())
    }

    async fn remove_members(
        &self,
        cid: &Cid,
        user_ids: &[UserId],
        message: Option<SendMessageRequest>,
    ) -> Result<()> {
        let names: Vec<&str> = user_ids.iter().map(UserId::as_str).collect();
        drop(self.begin(format!("remove_members {cid} {}", names.join(",")))?);
        if let Some(request) = message {
            self.send_message(cid, request).await?;
        }
        let mut events = Vec::new();
        {
            let mut state = self.lock();
            let channel = state.channel_mut(cid)?;
            for user_id in user_ids {
                if let Some(member) = channel.state.members.remove(user_id) {
                    events.push(
                        ChatEvent::for_channel(EventKind::MemberRemoved, cid.clone())
                            .with_user(member.user.clone())
                            .with_member(member),
                    );
                }
            }
            if user_ids.contains(&self.viewer) {
                channel.state.unread_count = 0;
                events.push(ChatEvent::for_channel(
                    EventKind::NotificationRemovedFromChannel,
                    cid.clone(),
                ));
            }
        }
        for event in events {
            self.publish(event);
        }
        Ok(())
    }

    async fn add_moderators(&self, cid: &Cid, user_ids: &[UserId]) -> Result<()> {
        let names: Vec<&str> = user_ids.iter().map(UserId::as_str).collect();
        let updated = {
            let mut state = self.begin(format!("add_moderators {cid} {}", names.join(",")))?;
            let channel = state.channel_mut(cid)?;
            user_ids
                .iter()
                .filter_map(|id| set_role(channel, id, MemberRole::Moderator))
                .collect::<Vec<_>>()
        };
        for member in updated {
            self.publish(ChatEvent::for_channel(EventKind::MemberUpdated, cid.clone()).with_member(member));
        }
        Ok(())
    }

    async fn demote_moderators(&self, cid: &Cid, user_ids: &[UserId]) -> Result<()> {
        let names: Vec<&str> = user_ids.iter().map(UserId::as_str).collect();
        let updated = {
            let mut state = self.begin(format!("demote_moderators {cid} {}", names.join(",")))?;
            let channel = state.channel_mut(cid)?;
            user_ids
                .iter()
                .filter_map(|id| set_role(channel, id, MemberRole::Member))
                .collect::<Vec<_>>()
        };
        for member in updated {
            self.publish(ChatEvent::for_channel(EventKind::MemberUpdated, cid.clone()).with_member(member));
        }
        Ok(())
    }

    async fn update_member_role(
        &self,
        cid: &Cid,
        user_id: &UserId,
        role: MemberRole,
    ) -> Result<()> {
        let member = {
            let mut state = self.begin(format!("update_member_role {cid} {user_id} {}", role.as_str()))?;
            let channel = state.channel_mut(cid)?;
            set_role(channel, user_id, role)
                .ok_or_else(|| not_found(format!("member {user_id} of {cid}")))?
        };
        self.publish(ChatEvent::for_channel(EventKind::MemberUpdated, cid.clone()).with_member(member));
        Ok(())
    }

    async fn mark_read(&self, cid: &Cid) -> Result<()> {
        let unread_channels = {
            let mut state = self.begin(format!("mark_read {cid}"))?;
            state.channel_mut(cid)?.state.unread_count = 0;
            state.unread_channels(&self.viewer)
        };
        let mut event = ChatEvent::for_channel(EventKind::NotificationMarkRead, cid.clone())
            .with_unread_channels(unread_channels);
        event.unread_count = Some(0);
        self.publish(event);
        Ok(())
    }

    async fn count_unread(&self, cid: &Cid) -> Result<u32> {
        let state = self.begin(format!("count_unread {cid}"))?;
        Ok(state.channel(cid)?.state.unread_count)
    }

    async fn keystroke(&self, cid: &Cid) -> Result<()> {
        let user = {
            let state = self.begin(format!("keystroke {cid}"))?;
            self.viewer_user(&state)
        };
        self.publish(ChatEvent::for_channel(EventKind::TypingStart, cid.clone()).with_user(user));
        Ok(())
    }

    async fn stop_typing(&self, cid: &Cid) -> Result<()> {
        let user = {
            let state = self.begin(format!("stop_typing {cid}"))?;
            self.viewer_user(&state)
        };
        self.publish(ChatEvent::for_channel(EventKind::TypingStop, cid.clone()).with_user(user));
        Ok(())
    }

    async fn partial_update_message(&self, id: &MessageId, set: MessagePatch) -> Result<Message> {
        let (cid, message) = {
            let mut state = self.begin(format!("partial_update_message {id}"))?;
            let (ci, mi) = state.locate_message(id)?;
            let channel = &mut state.channels[ci];
            let message = &mut channel.state.messages[mi];
            message.apply_patch(&set);
            message.updated_at = Some(Utc::now());
            (channel.cid.clone(), message.clone())
        };
        self.publish(ChatEvent::for_channel(EventKind::MessageUpdated, cid).with_message(message.clone()));
        Ok(message)
    }

    async fn delete_message(&self, id: &MessageId) -> Result<Message> {
        let (cid, message) = {
            let mut state = self.begin(format!("delete_message {id}"))?;
            let (ci, mi) = state.locate_message(id)?;
            let channel = &mut state.channels[ci];
            let tombstone = channel.state.messages[mi].clone().into_tombstone(Utc::now());
            channel.state.messages[mi] = tombstone.clone();
            channel.state.pinned_messages.retain(|pinned| &pinned.id != id);
            (channel.cid.clone(), tombstone)
        };
        self.publish(ChatEvent::for_channel(EventKind::MessageDeleted, cid).with_message(message.clone()));
        Ok(message)
    }

    async fn pin_message(&self, id: &MessageId) -> Result<Message> {
        self.set_pinned(format!("pin_message {id}"), id, true)
    }

    async fn unpin_message(&self, id: &MessageId) -> Result<Message> {
        self.set_pinned(format!("unpin_message {id}"), id, false)
    }
}

impl InMemoryBackend {
    fn set_pinned(&self, call: String, id: &MessageId, pinned: bool) -> Result<Message> {
        let (cid, message) = {
            let mut state = self.begin(call)?;
            let (ci, mi) = state.locate_message(id)?;
            let channel = &mut state.channels[ci];
            let message = &mut channel.state.messages[mi];
            message.pinned = pinned;
            message.pinned_at = pinned.then(Utc::now);
            let message = message.clone();
            channel.state.pinned_messages.retain(|known| &known.id != id);
            if pinned {
                channel.state.pinned_messages.insert(0, message.clone());
            }
            (channel.cid.clone(), message)
        };
        self.publish(ChatEvent::for_channel(EventKind::MessageUpdated, cid).with_message(message.clone()));
        Ok(message)
    }
}

#[derive(Default)]
pub struct InMemoryContacts {
    pub actors: Vec<ContactResult>,
    pub friends: Vec<ContactResult>,
}

#[async_trait]
impl ContactDirectory for InMemoryContacts {
    async fn search_actors(&self, name: &str) -> Result<Vec<ContactResult>> {
        Ok(self
            .actors
            .iter()
            .filter(|contact| name_matches(&contact.full_name(), name))
            .cloned()
            .collect())
    }

    async fn search_friends(&self, _user_id: &UserId, name: &str) -> Result<Vec<ContactResult>> {
        Ok(self
            .friends
            .iter()
            .filter(|contact| name_matches(&contact.full_name(), name))
            .cloned()
            .collect())
    }

    async fn is_friend(&self, actor_id: &str) -> Result<bool> {
        Ok(self.friends.iter().any(|friend| friend.actor_id == actor_id))
    }
}

#[derive(Default)]
pub struct RecordingAnalytics {
    events: Mutex<Vec<(AnalyticsEvent, Value)>>,
}

impl RecordingAnalytics {
    pub fn events(&self) -> Vec<(AnalyticsEvent, Value)> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AnalyticsSink for RecordingAnalytics {
    fn record_event(&self, event: AnalyticsEvent, payload: Value) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((event, payload));
    }
}

#[cfg(test)]
#[path = "tests/memory_tests.rs"]
mod tests;
