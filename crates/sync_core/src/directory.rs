//! Ordered list of the channels visible to the viewer.
//!
//! Activity moves a channel to the front and never re-sorts the rest. Every
//! handler is idempotent so a replayed or reordered feed converges on the
//! same list.

use std::time::Duration;

use shared::{
    domain::{Cid, UserId},
    event::{ChatEvent, EventKind},
    protocol::{Channel, ContactResult, Message},
    query::{ChannelFilters, ChannelOptions, ChannelSort},
};
use tracing::{debug, info, warn};

use crate::{
    context::SessionContext,
    event_bus::{Delivery, EventFilter, EventScope, EventSource, SubscriptionToken},
    notice::{Notice, NoticeContext},
    search::ChannelSearch,
    unread::{advance_authoritative, directory_should_recount},
};

const GLOBAL_KINDS: [EventKind; 5] = [
    EventKind::MessageNew,
    EventKind::NotificationMessageNew,
    EventKind::NotificationAddedToChannel,
    EventKind::ChannelUpdated,
    EventKind::UserPresenceChanged,
];

const ENTRY_KINDS: [EventKind; 5] = [
    EventKind::MessageNew,
    EventKind::MessageUpdated,
    EventKind::MessageDeleted,
    EventKind::NotificationMarkRead,
    EventKind::MemberRemoved,
];

#[derive(Debug, Clone, PartialEq)]
pub enum DirectoryEffect {
    RecountUnread { cid: Cid, delay: Duration },
    Reload { hard: bool },
    ActiveCleared,
}

#[derive(Debug, Default, PartialEq)]
pub struct DirectoryOutcome {
    pub changed: bool,
    pub effects: Vec<DirectoryEffect>,
}

impl DirectoryOutcome {
    fn changed() -> Self {
        Self {
            changed: true,
            effects: Vec::new(),
        }
    }

    fn with_effect(mut self, effect: DirectoryEffect) -> Self {
        self.effects.push(effect);
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ActiveState<'a> {
    pub cid: Option<&'a Cid>,
    pub near_bottom: bool,
}

#[derive(Debug)]
pub struct DirectoryEntry {
    pub channel: Channel,
    last_message: Option<Message>,
    unread_count: u32,
    tokens: Vec<SubscriptionToken>,
}

impl DirectoryEntry {
    fn new(channel: Channel) -> Self {
        Self {
            last_message: channel.last_message().cloned(),
            unread_count: channel.state.unread_count,
            channel,
            tokens: Vec::new(),
        }
    }

    pub fn cid(&self) -> &Cid {
        &self.channel.cid
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.last_message.as_ref()
    }

    pub fn unread_count(&self) -> u32 {
        self.unread_count
    }

    pub fn is_listening(&self) -> bool {
        !self.tokens.is_empty()
    }
}

pub struct ChannelDirectory {
    viewer: UserId,
    filters: ChannelFilters,
    sort: ChannelSort,
    limit: u32,
    entries: Vec<DirectoryEntry>,
    has_next_page: bool,
    loading: bool,
    render_tick: u64,
    draft: Option<ContactResult>,
    pub search: ChannelSearch,
    scope: EventScope,
    global_tokens: Vec<SubscriptionToken>,
    catch_all: Option<SubscriptionToken>,
}

impl ChannelDirectory {
    pub fn new(ctx: &SessionContext) -> Self {
        let viewer = ctx.user().id.clone();
        Self {
            filters: ChannelFilters::member_of(&viewer),
            sort: ChannelSort::default(),
            limit: ctx.settings.channels_fetch_limit,
            viewer,
            entries: Vec::new(),
            has_next_page: true,
            loading: true,
            render_tick: 0,
            draft: None,
            search: ChannelSearch::default(),
            scope: ctx.bus.scope(),
            global_tokens: Vec::new(),
            catch_all: None,
        }
    }

    pub fn mount(&mut self) {
        self.unmount();
        self.global_tokens = self.scope.subscribe_kinds(&EventSource::Global, &GLOBAL_KINDS);
        self.catch_all = Some(self.scope.subscribe(EventSource::Global, EventFilter::All));
        for index in 0..self.entries.len() {
            self.listen(index);
        }
        info!(subscriptions = self.scope.subscription_count(), "directory: mounted");
    }

    pub fn unmount(&mut self) {
        self.scope.teardown();
        self.global_tokens.clear();
        self.catch_all = None;
        for entry in &mut self.entries {
            entry.tokens.clear();
        }
    }

    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }

    pub fn cids(&self) -> Vec<&Cid> {
        self.entries.iter().map(DirectoryEntry::cid).collect()
    }

    pub fn find(&self, cid: &Cid) -> Option<&DirectoryEntry> {
        self.entries.iter().find(|entry| entry.cid() == cid)
    }

    fn position(&self, cid: &Cid) -> Option<usize> {
        self.entries.iter().position(|entry| entry.cid() == cid)
    }

    pub fn has_next_page(&self) -> bool {
        self.has_next_page
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn render_tick(&self) -> u64 {
        self.render_tick
    }

    pub fn draft(&self) -> Option<&ContactResult> {
        self.draft.as_ref()
    }

    pub fn open_draft(&mut self, contact: ContactResult) {
        info!(actor_id = %contact.actor_id, "directory: draft conversation opened");
        self.draft = Some(contact);
    }

    pub fn clear_draft(&mut self) -> Option<ContactResult> {
        self.draft.take()
    }

    fn listen(&mut self, index: usize) {
        let source = EventSource::Channel(self.entries[index].cid().clone());
        let tokens = self.scope.subscribe_kinds(&source, &ENTRY_KINDS);
        self.entries[index].tokens = tokens;
    }

    fn stop_listening(&mut self, index: usize) {
        let tokens = std::mem::take(&mut self.entries[index].tokens);
        for token in tokens {
            self.scope.unsubscribe(token);
        }
    }

    fn replace_entries(&mut self, channels: Vec<Channel>) {
        self.clear_entries();
        self.append_entries(channels);
    }

    fn clear_entries(&mut self) {
        for index in 0..self.entries.len() {
            self.stop_listening(index);
        }
        self.entries.clear();
    }

    fn append_entries(&mut self, channels: Vec<Channel>) {
        for channel in channels {
            if self.position(&channel.cid).is_some() {
                continue;
            }
            self.entries.push(DirectoryEntry::new(channel));
            self.listen(self.entries.len() - 1);
        }
    }

    fn prepend(&mut self, channel: Channel) -> bool {
        if self.position(&channel.cid).is_some() {
            return false;
        }
        self.entries.insert(0, DirectoryEntry::new(channel));
        self.listen(0);
        true
    }

    fn evict(&mut self, cid: &Cid) -> bool {
        let Some(index) = self.position(cid) else {
            return false;
        };
        self.stop_listening(index);
        self.entries.remove(index);
        info!(%cid, "directory: channel evicted");
        true
    }

    pub async fn load_first_page(
        &mut self,
        ctx: &SessionContext,
        active: Option<&Cid>,
    ) -> Option<Cid> {
        self.reload(ctx, true, active).await
    }

    /// Re-queries from offset 0. A hard reload empties the list and may
    /// auto-select; a soft one swaps the list in place and keeps it on failure.
    pub async fn reload(
        &mut self,
        ctx: &SessionContext,
        hard: bool,
        active: Option<&Cid>,
    ) -> Option<Cid> {
        if hard {
            self.loading = true;
            self.clear_entries();
        }
        let options = ChannelOptions::watched_page(self.limit, 0);
        match ctx
            .backend
            .query_channels(&self.filters, &self.sort, &options)
            .await
        {
            Ok(channels) => {
                self.loading = false;
                self.has_next_page = channels.len() >= options.limit as usize;
                self.replace_entries(channels);
                info!(count = self.entries.len(), hard, "directory: reloaded");
                let auto_select = hard
                    && active.is_none()
                    && self.draft.is_none()
                    && !self.search.is_active();
                if auto_select {
                    self.entries.first().map(|entry| entry.cid().clone())
                } else {
                    None
                }
            }
            Err(err) => {
                self.loading = false;
                ctx.notify(Notice::from_error(NoticeContext::LoadChannels, &err));
                None
            }
        }
    }

    pub async fn load_next_page(&mut self, ctx: &SessionContext) -> bool {
        if !self.has_next_page {
            return false;
        }
        let options = ChannelOptions::watched_page(self.limit, self.entries.len() as u32);
        match ctx
            .backend
            .query_channels(&self.filters, &self.sort, &options)
            .await
        {
            Ok(channels) => {
                self.has_next_page = channels.len() >= options.limit as usize;
                let before = self.entries.len();
                self.append_entries(channels);
                debug!(added = self.entries.len() - before, "directory: next page appended");
                true
            }
            Err(err) => {
                ctx.notify(Notice::from_error(NoticeContext::LoadChannels, &err));
                false
            }
        }
    }

    async fn lookup(&self, ctx: &SessionContext, cid: &Cid) -> Option<Channel> {
        let filters = ChannelFilters::member_of(&self.viewer).with_id(cid.id.clone());
        match ctx
            .backend
            .query_channels(&filters, &self.sort, &ChannelOptions::watched_page(1, 0))
            .await
        {
            Ok(channels) => channels.into_iter().next(),
            Err(err) => {
                warn!(%cid, error = %err, "directory: channel lookup failed");
                None
            }
        }
    }

    pub fn try_next(&mut self) -> Option<Delivery> {
        self.scope.try_recv()
    }

    pub async fn next_delivery(&mut self) -> Option<Delivery> {
        self.scope.recv().await
    }

    pub async fn handle(
        &mut self,
        ctx: &SessionContext,
        delivery: &Delivery,
        active: ActiveState<'_>,
    ) -> DirectoryOutcome {
        let event = &delivery.event;
        if Some(delivery.token) == self.catch_all {
            return match event.kind {
                EventKind::ChannelDeleted | EventKind::NotificationRemovedFromChannel => {
                    self.on_channel_gone(event, active)
                }
                _ => DirectoryOutcome::default(),
            };
        }
        if self.global_tokens.contains(&delivery.token) {
            return match event.kind {
                EventKind::MessageNew | EventKind::NotificationMessageNew => {
                    self.on_activity(ctx, event).await
                }
                EventKind::NotificationAddedToChannel => self.on_added(ctx, event).await,
                EventKind::ChannelUpdated => self.on_channel_updated(event),
                EventKind::UserPresenceChanged => self.on_presence(event),
                _ => DirectoryOutcome::default(),
            };
        }
        let Some(index) = self
            .entries
            .iter()
            .position(|entry| entry.tokens.contains(&delivery.token))
        else {
            debug!(token = ?delivery.token, "directory: stale delivery dropped");
            return DirectoryOutcome::default();
        };
        match event.kind {
            EventKind::MessageNew => self.on_entry_message(index, event, active),
            EventKind::MessageUpdated => self.on_entry_updated(index, event),
            EventKind::MessageDeleted => self.on_entry_deleted(index, event),
            EventKind::NotificationMarkRead => self.on_entry_read(ctx, index, event),
            EventKind::MemberRemoved => self.on_entry_member_removed(index, event),
            _ => DirectoryOutcome::default(),
        }
    }

    async fn on_activity(&mut self, ctx: &SessionContext, event: &ChatEvent) -> DirectoryOutcome {
        let Some(cid) = event.target_cid() else {
            return DirectoryOutcome::default();
        };
        if let Some(index) = self.position(&cid) {
            if index == 0 {
                return DirectoryOutcome::default();
            }
            let entry = self.entries.remove(index);
            self.entries.insert(0, entry);
            debug!(%cid, from = index, "directory: channel moved to front");
            return DirectoryOutcome::changed();
        }
        let Some(channel) = self.lookup(ctx, &cid).await else {
            return DirectoryOutcome::default();
        };
        if !self.prepend(channel) {
            return DirectoryOutcome::default();
        }
        info!(%cid, "directory: channel discovered");
        DirectoryOutcome::changed()
    }

    async fn on_added(&mut self, ctx: &SessionContext, event: &ChatEvent) -> DirectoryOutcome {
        let Some(cid) = event.target_cid() else {
            return DirectoryOutcome::default();
        };
        if self.position(&cid).is_some() {
            return DirectoryOutcome::default();
        }
        let Some(channel) = self.lookup(ctx, &cid).await else {
            return DirectoryOutcome::default();
        };
        if !self.prepend(channel) {
            return DirectoryOutcome::default();
        }
        info!(%cid, "directory: added to channel");
        DirectoryOutcome::changed()
    }

    fn on_channel_gone(&mut self, event: &ChatEvent, active: ActiveState<'_>) -> DirectoryOutcome {
        let Some(cid) = event.target_cid() else {
            return DirectoryOutcome::default();
        };
        let was_active = active.cid == Some(&cid);
        let evicted = self.evict(&cid);
        let mut outcome = DirectoryOutcome {
            changed: evicted,
            effects: Vec::new(),
        };
        if was_active {
            outcome.effects.push(DirectoryEffect::ActiveCleared);
        }
        outcome
    }

    fn bump(&mut self) -> DirectoryOutcome {
        self.render_tick += 1;
        DirectoryOutcome::changed()
    }

    fn on_channel_updated(&mut self, event: &ChatEvent) -> DirectoryOutcome {
        if let (Some(channel), Some(cid)) = (&event.channel, event.target_cid()) {
            if let Some(index) = self.position(&cid) {
                self.entries[index].channel.data = channel.data.clone();
            }
        }
        self.bump()
    }

    fn on_presence(&mut self, event: &ChatEvent) -> DirectoryOutcome {
        if let Some(user) = &event.user {
            for entry in &mut self.entries {
                if let Some(member) = entry.channel.state.members.get_mut(&user.id) {
                    member.user.online = user.online;
                    member.user.last_active = user.last_active;
                }
            }
        }
        self.bump()
    }

    fn on_entry_message(
        &mut self,
        index: usize,
        event: &ChatEvent,
        active: ActiveState<'_>,
    ) -> DirectoryOutcome {
        let Some(message) = &event.message else {
            return DirectoryOutcome::default();
        };
        let viewer = self.viewer.clone();
        let entry = &mut self.entries[index];
        if entry.last_message.as_ref().is_some_and(|last| last.id == message.id) {
            debug!(
                cid = %entry.channel.cid,
                id = %message.id,
                "directory: redelivered message ignored"
            );
            return DirectoryOutcome::default();
        }
        advance_authoritative(&mut entry.channel.state.unread_count, event, &viewer);
        let is_active = active.cid == Some(&entry.channel.cid);
        if directory_should_recount(is_active, active.near_bottom) {
            entry.unread_count = entry.channel.state.unread_count;
        }
        entry.channel.data.last_message_at = Some(message.created_at);
        entry.last_message = Some(message.clone());
        DirectoryOutcome::changed()
    }

    fn on_entry_updated(&mut self, index: usize, event: &ChatEvent) -> DirectoryOutcome {
        let entry = &mut self.entries[index];
        match (&event.message, &entry.last_message) {
            (Some(message), Some(last)) if last.id == message.id && last != message => {
                entry.last_message = Some(message.clone());
                DirectoryOutcome::changed()
            }
            _ => DirectoryOutcome::default(),
        }
    }

    fn on_entry_deleted(&mut self, index: usize, event: &ChatEvent) -> DirectoryOutcome {
        let entry = &self.entries[index];
        match (&event.message, &entry.last_message) {
            (Some(message), Some(last)) if last.id == message.id => {
                debug!(cid = %entry.channel.cid, "directory: last message deleted");
                DirectoryOutcome::default().with_effect(DirectoryEffect::Reload { hard: false })
            }
            _ => DirectoryOutcome::default(),
        }
    }

    fn on_entry_read(
        &mut self,
        ctx: &SessionContext,
        index: usize,
        event: &ChatEvent,
    ) -> DirectoryOutcome {
        if event.unread_count.is_none() {
            return DirectoryOutcome::default();
        }
        let viewer = self.viewer.clone();
        let entry = &mut self.entries[index];
        advance_authoritative(&mut entry.channel.state.unread_count, event, &viewer);
        let cid = entry.channel.cid.clone();
        self.bump().with_effect(DirectoryEffect::RecountUnread {
            cid,
            delay: ctx.settings.mark_read_settle_delay(),
        })
    }

    fn on_entry_member_removed(&mut self, index: usize, event: &ChatEvent) -> DirectoryOutcome {
        let removed = event
            .member
            .as_ref()
            .map(|member| member.user.id.clone())
            .or_else(|| event.user.as_ref().map(|user| user.id.clone()));
        let entry = &mut self.entries[index];
        if let Some(removed) = &removed {
            entry.channel.state.members.remove(removed);
        }
        let unreachable =
            removed.as_ref() == Some(&self.viewer) || entry.channel.state.members.is_empty();
        if !unreachable {
            return DirectoryOutcome::changed();
        }
        entry.unread_count = 0;
        entry.channel.state.unread_count = 0;
        let cid = entry.channel.cid.clone();
        self.stop_listening(index);
        info!(%cid, "directory: channel unreachable");
        DirectoryOutcome::changed()
    }

    pub fn apply_recount(&mut self, cid: &Cid, count: u32) -> bool {
        let Some(index) = self.position(cid) else {
            return false;
        };
        let entry = &mut self.entries[index];
        entry.channel.state.unread_count = count;
        if entry.unread_count == count {
            return false;
        }
        entry.unread_count = count;
        true
    }
}

#[cfg(test)]
#[path = "tests/directory_tests.rs"]
mod tests;
