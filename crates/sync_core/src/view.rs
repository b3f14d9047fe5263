use anyhow::Result;
use chrono::Utc;
use shared::{
    domain::{Cid, MessageId},
    event::{ChatEvent, EventKind},
    protocol::{Attachment, Channel, FileUpload, Message},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    commands,
    context::SessionContext,
    event_bus::{Delivery, EventScope, EventSource},
    notice::{Notice, NoticeContext},
    presence,
    scroll::{ScrollAction, ScrollAnchor, ScrollViewport},
    separators::{process_message_separators, TimelineEntry},
    timeline::{Generation, MessageTimeline, PageOutcome, TimelinePhase},
    unread::{advance_authoritative, on_new_message, TimelineUnread},
};

const CHANNEL_KINDS: [EventKind; 9] = [
    EventKind::MessageNew,
    EventKind::MessageUpdated,
    EventKind::MessageDeleted,
    EventKind::ChannelUpdated,
    EventKind::MemberUpdated,
    EventKind::MemberAdded,
    EventKind::TypingStart,
    EventKind::TypingStop,
    EventKind::NotificationMarkRead,
];

#[derive(Debug, Default, PartialEq)]
pub struct ViewOutcome {
    pub timeline_changed: bool,
    pub rerender: bool,
    pub scroll: Vec<ScrollAction>,
}

impl ViewOutcome {
    fn merge(&mut self, other: ViewOutcome) {
        self.timeline_changed |= other.timeline_changed;
        self.rerender |= other.rerender;
        self.scroll.extend(other.scroll);
    }
}

#[derive(Debug, PartialEq)]
pub enum SubmitOutcome {
    Ignored,
    Sent(Message),
    Edited(Message),
    Failed,
}

pub struct ChannelView {
    channel: Option<Channel>,
    pub timeline: MessageTimeline,
    pub anchor: ScrollAnchor,
    unread: TimelineUnread,
    render_tick: u64,
    editing: Option<Message>,
    loading: bool,
    scope: EventScope,
}

impl ChannelView {
    pub fn new(ctx: &SessionContext) -> Self {
        Self {
            channel: None,
            timeline: MessageTimeline::new(ctx.settings.messages_fetch_limit),
            anchor: ScrollAnchor::new(&ctx.settings),
            unread: TimelineUnread::default(),
            render_tick: 0,
            editing: None,
            loading: false,
            scope: ctx.bus.scope(),
        }
    }

    pub fn channel(&self) -> Option<&Channel> {
        self.channel.as_ref()
    }

    pub fn cid(&self) -> Option<&Cid> {
        self.timeline.cid()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn unread_count(&self) -> u32 {
        self.unread.count()
    }

    pub fn render_tick(&self) -> u64 {
        self.render_tick
    }

    pub fn editing(&self) -> Option<&Message> {
        self.editing.as_ref()
    }

    pub fn start_edit(&mut self, message: Message) {
        self.editing = Some(message);
    }

    pub fn cancel_edit(&mut self) {
        self.editing = None;
    }

    pub fn pinned_message(&self) -> Option<&Message> {
        self.channel
            .as_ref()
            .and_then(|channel| channel.state.pinned_messages.first())
    }

    pub fn entries(&self) -> Vec<TimelineEntry> {
        process_message_separators(self.timeline.messages(), self.unread.count() as usize)
    }

    pub fn input_disabled(&self, ctx: &SessionContext) -> bool {
        self.channel
            .as_ref()
            .is_some_and(|channel| presence::is_input_disabled(channel, ctx.user().role))
    }

    pub fn blocked_for_minor(&self, ctx: &SessionContext) -> bool {
        ctx.is_minor()
            && self
                .channel
                .as_ref()
                .is_some_and(|channel| !presence::is_channel_enabled_for_minor(channel, &ctx.user().id))
    }

    pub fn begin(&mut self, ctx: &SessionContext, cid: Cid) -> Generation {
        self.scope.teardown();
        self.channel = None;
        self.editing = None;
        self.unread.reset_from(0);
        self.loading = true;
        let generation = self.timeline.begin(cid.clone());
        self.scope
            .subscribe_kinds(&EventSource::Channel(cid), &CHANNEL_KINDS);
        self.scope
            .subscribe_kinds(&EventSource::Global, &[EventKind::UserPresenceChanged]);
        debug!(subscriptions = self.scope.subscription_count(), user = %ctx.user().id, "view: subscribed");
        generation
    }

    pub async fn finish(
        &mut self,
        ctx: &SessionContext,
        generation: Generation,
        result: Result<Channel>,
        viewport: &mut dyn ScrollViewport,
    ) -> ViewOutcome {
        if generation != self.timeline.generation() {
            debug!("view: superseded activation discarded");
            return ViewOutcome::default();
        }
        self.loading = false;
        let mut channel = match result {
            Ok(channel) => channel,
            Err(err) => {
                self.timeline.fail_initial(generation);
                ctx.notify(Notice::from_error(NoticeContext::LoadMessages, &err));
                return ViewOutcome::default();
            }
        };
        if !self.timeline.finish_initial(generation, &mut channel) {
            return ViewOutcome::default();
        }
        self.unread.reset_from(channel.state.unread_count);
        info!(cid = %channel.cid, unread = self.unread.count(), "view: channel opened");
        self.channel = Some(channel);

        viewport.sync(self.timeline.messages());
        let mut outcome = ViewOutcome {
            timeline_changed: true,
            rerender: true,
            scroll: vec![self.anchor.on_channel_changed(&*viewport)],
        };
        outcome.scroll.extend(self.after_change(ctx, viewport).await);
        outcome
    }

    pub async fn activate(
        &mut self,
        ctx: &SessionContext,
        cid: Cid,
        viewport: &mut dyn ScrollViewport,
    ) -> ViewOutcome {
        let generation = self.begin(ctx, cid.clone());
        let result = ctx.backend.watch_channel(&cid).await;
        self.finish(ctx, generation, result, viewport).await
    }

    pub fn close(&mut self) {
        self.scope.teardown();
        self.timeline.reset();
        self.channel = None;
        self.editing = None;
        self.loading = false;
        self.unread.reset_from(0);
    }

    pub fn try_next(&mut self) -> Option<Delivery> {
        self.scope.try_recv()
    }

    pub async fn next_delivery(&mut self) -> Option<Delivery> {
        self.scope.recv().await
    }

    async fn after_change(
        &mut self,
        ctx: &SessionContext,
        viewport: &mut dyn ScrollViewport,
    ) -> Vec<ScrollAction> {
        viewport.sync(self.timeline.messages());
        let actions =
            self.anchor
                .on_messages_changed(self.timeline.messages(), &ctx.user().id, &*viewport);
        self.mark_read_if_seen(ctx, &*viewport).await;
        actions
    }

    async fn mark_read_if_seen(&self, ctx: &SessionContext, viewport: &dyn ScrollViewport) {
        if self.timeline.phase() != TimelinePhase::Loaded
            || !self.anchor.near_bottom()
            || !viewport.is_foreground()
        {
            return;
        }
        let Some(channel) = &self.channel else {
            return;
        };
        if let Err(err) = ctx.backend.mark_read(&channel.cid).await {
            warn!(cid = %channel.cid, error = %err, "view: mark read failed");
        }
    }

    fn tick(&mut self) -> ViewOutcome {
        self.render_tick += 1;
        ViewOutcome {
            timeline_changed: self.timeline.reconcile(),
            rerender: true,
            scroll: Vec::new(),
        }
    }

    pub async fn handle(
        &mut self,
        ctx: &SessionContext,
        delivery: &Delivery,
        viewport: &mut dyn ScrollViewport,
    ) -> ViewOutcome {
        if !self.scope.is_subscribed(delivery.token) || self.channel.is_none() {
            return ViewOutcome::default();
        }
        let event = &delivery.event;
        let mut outcome = match event.kind {
            EventKind::MessageNew => self.on_message_new(ctx, event),
            EventKind::MessageUpdated | EventKind::MessageDeleted => self.on_message_changed(event),
            EventKind::NotificationMarkRead => {
                if let Some(channel) = &mut self.channel {
                    advance_authoritative(&mut channel.state.unread_count, event, &ctx.user().id);
                }
                ViewOutcome::default()
            }
            EventKind::ChannelUpdated => {
                if let (Some(channel), Some(updated)) = (&mut self.channel, &event.channel) {
                    channel.data = updated.data.clone();
                }
                self.tick()
            }
            EventKind::MemberUpdated | EventKind::MemberAdded => {
                if let (Some(channel), Some(member)) = (&mut self.channel, &event.member) {
                    channel
                        .state
                        .members
                        .insert(member.user.id.clone(), member.clone());
                }
                self.tick()
            }
            EventKind::TypingStart | EventKind::TypingStop => self.on_typing(ctx, event),
            EventKind::UserPresenceChanged => self.on_presence(ctx, event),
            _ => ViewOutcome::default(),
        };
        if outcome.timeline_changed {
            outcome.scroll.extend(self.after_change(ctx, viewport).await);
        }
        outcome
    }

    fn on_message_new(&mut self, ctx: &SessionContext, event: &ChatEvent) -> ViewOutcome {
        let (Some(channel), Some(message)) = (&mut self.channel, &event.message) else {
            return ViewOutcome::default();
        };
        let change = self.timeline.apply_event(event);
        if change.appended() {
            let viewer = &ctx.user().id;
            advance_authoritative(&mut channel.state.unread_count, event, viewer);
            let own = &message.user.id == viewer;
            let update = on_new_message(self.anchor.near_bottom(), self.unread.count(), own);
            self.unread.apply(update, channel.state.unread_count);
        }
        ViewOutcome {
            timeline_changed: change.changed(),
            rerender: true,
            scroll: Vec::new(),
        }
    }

    fn on_message_changed(&mut self, event: &ChatEvent) -> ViewOutcome {
        if let (Some(channel), Some(message)) = (&mut self.channel, &event.message) {
            let pinned = &mut channel.state.pinned_messages;
            pinned.retain(|known| known.id != message.id);
            if message.pinned && !message.is_deleted() && event.kind == EventKind::MessageUpdated {
                pinned.insert(0, message.clone());
            }
        }
        let changed = self.timeline.apply_event(event).changed();
        let mut outcome = self.tick();
        outcome.timeline_changed |= changed;
        outcome
    }

    fn on_typing(&mut self, ctx: &SessionContext, event: &ChatEvent) -> ViewOutcome {
        if let (Some(channel), Some(user)) = (&mut self.channel, &event.user) {
            if user.id != ctx.user().id {
                if event.kind == EventKind::TypingStart {
                    channel.state.typing.insert(user.id.clone());
                } else {
                    channel.state.typing.remove(&user.id);
                }
            }
        }
        self.tick()
    }

    fn on_presence(&mut self, ctx: &SessionContext, event: &ChatEvent) -> ViewOutcome {
        let (Some(channel), Some(user)) = (&mut self.channel, &event.user) else {
            return ViewOutcome::default();
        };
        let is_companion = presence::private_companion(channel, &ctx.user().id)
            .is_some_and(|companion| companion.user.id == user.id);
        if !is_companion {
            return ViewOutcome::default();
        }
        if let Some(member) = channel.state.members.get_mut(&user.id) {
            member.user.online = user.online;
            member.user.last_active = user.last_active;
        }
        self.tick()
    }

    pub async fn on_scroll(
        &mut self,
        ctx: &SessionContext,
        scroll_top: f64,
        viewport: &dyn ScrollViewport,
    ) {
        let was_near_bottom = self.anchor.near_bottom();
        self.anchor.on_scroll(scroll_top, viewport.metrics());
        if self.anchor.near_bottom() && !was_near_bottom {
            self.mark_read_if_seen(ctx, viewport).await;
        }
    }

    pub async fn load_older(
        &mut self,
        ctx: &SessionContext,
        viewport: &mut dyn ScrollViewport,
    ) -> ViewOutcome {
        match self.timeline.load_older(ctx.backend.as_ref()).await {
            PageOutcome::Applied { added } if added > 0 => ViewOutcome {
                timeline_changed: true,
                rerender: true,
                scroll: self.after_change(ctx, viewport).await,
            },
            PageOutcome::Failed(err) => {
                ctx.notify(Notice::from_error(NoticeContext::LoadMessages, &err));
                ViewOutcome::default()
            }
            _ => ViewOutcome::default(),
        }
    }

    /// Scrolls to the pinned message, paging older history until it is
    /// rendered or the history runs out. A failed page keeps the seek armed
    /// so a later scroll can still reach the target.
    pub async fn seek_pinned(
        &mut self,
        ctx: &SessionContext,
        viewport: &mut dyn ScrollViewport,
    ) -> ViewOutcome {
        let Some(target) = self.pinned_message().map(|message| message.id.clone()) else {
            return ViewOutcome::default();
        };
        let mut outcome = ViewOutcome {
            scroll: vec![self.anchor.seek(target.clone(), &*viewport)],
            ..ViewOutcome::default()
        };
        while self.anchor.pinned_target().is_some() && self.timeline.has_next_page() {
            let page = self.load_older(ctx, viewport).await;
            if !page.timeline_changed {
                break;
            }
            outcome.merge(page);
        }
        if self.anchor.pinned_target().is_some() && !self.timeline.has_next_page() {
            debug!(%target, "view: pinned message not reachable");
            self.anchor.cancel_seek();
        }
        outcome
    }

    pub async fn set_typing(&self, ctx: &SessionContext, in_progress: bool) {
        let Some(cid) = self.channel.as_ref().map(|channel| &channel.cid) else {
            return;
        };
        let result = if in_progress {
            ctx.backend.keystroke(cid).await
        } else {
            ctx.backend.stop_typing(cid).await
        };
        if let Err(err) = result {
            warn!(%cid, error = %err, "view: typing notification failed");
        }
    }

    pub async fn submit(
        &mut self,
        ctx: &SessionContext,
        text: &str,
        new_files: &[FileUpload],
        kept_files: &[Attachment],
        viewport: &mut dyn ScrollViewport,
    ) -> (SubmitOutcome, ViewOutcome) {
        let Some(channel) = self.channel.clone() else {
            return (SubmitOutcome::Ignored, ViewOutcome::default());
        };
        let new_data = !text.is_empty() || !new_files.is_empty();
        let old_removed = self
            .editing
            .as_ref()
            .is_some_and(|original| kept_files.len() < original.attachments.len());
        if !new_data && !old_removed {
            return (SubmitOutcome::Ignored, ViewOutcome::default());
        }
        match self.editing.clone() {
            Some(original) => {
                self.submit_edit(ctx, &channel, original, text, new_files, kept_files, viewport)
                    .await
            }
            None => self.submit_send(ctx, &channel, text, new_files, viewport).await,
        }
    }

    async fn submit_send(
        &mut self,
        ctx: &SessionContext,
        channel: &Channel,
        text: &str,
        files: &[FileUpload],
        viewport: &mut dyn ScrollViewport,
    ) -> (SubmitOutcome, ViewOutcome) {
        let correlation = MessageId::new(Uuid::new_v4().to_string());
        let mut outcome = ViewOutcome::default();
        if !text.is_empty() {
            self.timeline.stage_send(Message::new(
                correlation.as_str(),
                ctx.user().clone(),
                text,
                Utc::now(),
            ));
            outcome.timeline_changed = true;
            outcome.scroll = self.after_change(ctx, viewport).await;
        }

        let result =
            commands::send_message(ctx, channel, text, files, Some(correlation.clone())).await;
        let submitted = match result {
            Ok(Some(message)) => {
                if self.timeline.confirm(message.clone()).changed() {
                    outcome.timeline_changed = true;
                    outcome.scroll.extend(self.after_change(ctx, viewport).await);
                }
                SubmitOutcome::Sent(message)
            }
            Ok(None) => {
                self.rollback(&correlation, &mut outcome);
                SubmitOutcome::Ignored
            }
            Err(err) => {
                self.rollback(&correlation, &mut outcome);
                ctx.notify(Notice::from_error(NoticeContext::SendMessage, &err));
                SubmitOutcome::Failed
            }
        };
        (submitted, outcome)
    }

    #[allow(clippy::too_many_arguments)]
    async fn submit_edit(
        &mut self,
        ctx: &SessionContext,
        channel: &Channel,
        original: Message,
        text: &str,
        new_files: &[FileUpload],
        kept_files: &[Attachment],
        viewport: &mut dyn ScrollViewport,
    ) -> (SubmitOutcome, ViewOutcome) {
        let mut staged = original.clone();
        staged.apply_patch(&commands::edit_patch(text, kept_files, Vec::new()));
        let mut outcome = ViewOutcome::default();
        if self.timeline.stage_edit(staged) {
            outcome.timeline_changed = true;
            outcome.scroll = self.after_change(ctx, viewport).await;
        }

        let result =
            commands::edit_message(ctx, &channel.cid, &original, text, new_files, kept_files).await;
        let submitted = match result {
            Ok(message) => {
                self.editing = None;
                if self.timeline.confirm(message.clone()).changed() {
                    outcome.timeline_changed = true;
                }
                SubmitOutcome::Edited(message)
            }
            Err(err) => {
                self.rollback(&original.id, &mut outcome);
                ctx.notify(Notice::from_error(NoticeContext::EditMessage, &err));
                SubmitOutcome::Failed
            }
        };
        (submitted, outcome)
    }

    fn rollback(&mut self, correlation: &MessageId, outcome: &mut ViewOutcome) {
        if self.timeline.discard(correlation).changed() {
            outcome.timeline_changed = true;
        }
    }

    pub async fn delete_message(&mut self, ctx: &SessionContext, message: &Message) -> bool {
        let Some(cid) = self.cid().cloned() else {
            return false;
        };
        match commands::delete_message(ctx, &cid, message).await {
            Ok(_) => true,
            Err(err) => {
                ctx.notify(Notice::from_error(NoticeContext::ChannelAction, &err));
                false
            }
        }
    }

    pub async fn toggle_pin(&mut self, ctx: &SessionContext, message: &Message) -> bool {
        let Some(channel) = &self.channel else {
            return false;
        };
        match commands::toggle_pin(ctx, channel, message).await {
            Ok(()) => true,
            Err(err) => {
                ctx.notify(Notice::from_error(NoticeContext::ChannelAction, &err));
                false
            }
        }
    }

    pub async fn toggle_availability(&mut self, ctx: &SessionContext) -> bool {
        let Some(channel) = &self.channel else {
            return false;
        };
        match commands::toggle_availability(ctx, channel).await {
            Ok(()) => true,
            Err(err) => {
                ctx.notify(Notice::from_error(NoticeContext::ChannelAction, &err));
                false
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/view_tests.rs"]
mod tests;
