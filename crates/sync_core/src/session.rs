use anyhow::Result;
use shared::{
    domain::{Cid, UserRole},
    protocol::{Attachment, ChannelPatch, ChatUser, FileUpload, Message, UserPatch},
};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    commands::{self, GroupDetails},
    context::{SessionContext, SessionEvent},
    directory::{ActiveState, ChannelDirectory, DirectoryEffect, DirectoryOutcome},
    event_bus::{Delivery, EventFilter, EventScope, EventSource},
    notice::{Notice, NoticeContext},
    scroll::{RowViewport, ScrollViewport},
    search::{SearchResult, SearchSelection},
    unread::UnreadBadge,
    view::{ChannelView, SubmitOutcome, ViewOutcome},
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoginProfile {
    pub name: String,
    pub image: Option<String>,
    pub role: UserRole,
    pub custom_id: Option<String>,
    pub custom_gender_pronoun: Option<String>,
    pub is_minor: bool,
}

pub fn profile_patch(current: &ChatUser, profile: &LoginProfile) -> UserPatch {
    let differs = |stored: &Option<String>, wanted: &Option<String>| {
        wanted.is_some() && stored != wanted
    };
    UserPatch {
        name: (current.name != profile.name).then(|| profile.name.clone()),
        image: differs(&current.image, &profile.image)
            .then(|| profile.image.clone())
            .flatten(),
        role: (current.role != profile.role).then_some(profile.role),
        custom_id: differs(&current.custom_id, &profile.custom_id)
            .then(|| profile.custom_id.clone())
            .flatten(),
        custom_gender_pronoun: differs(
            &current.custom_gender_pronoun,
            &profile.custom_gender_pronoun,
        )
        .then(|| profile.custom_gender_pronoun.clone())
        .flatten(),
    }
}

pub struct ChatSession {
    ctx: SessionContext,
    pub directory: ChannelDirectory,
    pub view: ChannelView,
    badge: UnreadBadge,
    badge_scope: EventScope,
    viewport: Box<dyn ScrollViewport>,
    recount_tx: mpsc::UnboundedSender<(Cid, u32)>,
    recount_rx: mpsc::UnboundedReceiver<(Cid, u32)>,
    recounts: Vec<JoinHandle<()>>,
}

impl ChatSession {
    pub fn new(ctx: SessionContext) -> Self {
        let (recount_tx, recount_rx) = mpsc::unbounded_channel();
        let mut badge_scope = ctx.bus.scope();
        badge_scope.subscribe(EventSource::Global, EventFilter::All);
        Self {
            directory: ChannelDirectory::new(&ctx),
            view: ChannelView::new(&ctx),
            badge: UnreadBadge::from_user(ctx.user()),
            badge_scope,
            viewport: Box::new(RowViewport::new(1.0, 20.0)),
            recount_tx,
            recount_rx,
            recounts: Vec::new(),
            ctx,
        }
    }

    pub async fn login(ctx: SessionContext, profile: &LoginProfile) -> Result<Self> {
        let mut ctx = ctx.with_minor(profile.is_minor);
        let current = ctx.backend.current_user().await?;
        let patch = profile_patch(&current, profile);
        let user = if patch.is_empty() {
            current
        } else {
            info!(user = %current.id, "session: syncing profile");
            ctx.backend.partial_update_user(&current.id, patch).await?
        };
        ctx.set_user(user);
        info!(user = %ctx.user().id, role = ?ctx.user().role, "session: logged in");

        let mut session = Self::new(ctx);
        session.start().await;
        Ok(session)
    }

    pub fn with_viewport(mut self, viewport: Box<dyn ScrollViewport>) -> Self {
        self.viewport = viewport;
        self
    }

    pub fn ctx(&self) -> &SessionContext {
        &self.ctx
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.ctx.subscribe()
    }

    pub fn has_unread(&self) -> bool {
        self.badge.has_unread()
    }

    pub fn active_cid(&self) -> Option<&Cid> {
        self.view.cid()
    }

    pub async fn start(&mut self) {
        self.directory.mount();
        let selected = self
            .directory
            .load_first_page(&self.ctx, self.view.cid())
            .await;
        self.ctx.emit(SessionEvent::DirectoryChanged);
        if let Some(cid) = selected {
            self.activate(cid).await;
        }
    }

    pub async fn load_more_channels(&mut self) {
        if self.directory.load_next_page(&self.ctx).await {
            self.ctx.emit(SessionEvent::DirectoryChanged);
        }
    }

    pub async fn activate(&mut self, cid: Cid) {
        if self.directory.clear_draft().is_some() {
            self.ctx.emit(SessionEvent::DirectoryChanged);
        }
        self.ctx
            .emit(SessionEvent::ActiveChannelChanged(Some(cid.clone())));
        let outcome = self
            .view
            .activate(&self.ctx, cid, &mut *self.viewport)
            .await;
        self.emit_view(outcome);
    }

    pub fn close(&mut self) {
        if self.view.cid().is_none() {
            return;
        }
        self.view.close();
        self.ctx.emit(SessionEvent::ActiveChannelChanged(None));
    }

    fn emit_view(&self, outcome: ViewOutcome) {
        if let (true, Some(cid)) = (
            outcome.timeline_changed || outcome.rerender,
            self.view.cid(),
        ) {
            self.ctx.emit(SessionEvent::TimelineChanged(cid.clone()));
        }
        for action in outcome.scroll {
            self.ctx.emit(SessionEvent::Scroll(action));
        }
    }

    pub async fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let mut progressed = false;
            while let Ok((cid, count)) = self.recount_rx.try_recv() {
                self.on_recount(&cid, count);
                progressed = true;
            }
            if let Some(delivery) = self.badge_scope.try_recv() {
                self.on_badge_delivery(&delivery);
                handled += 1;
                progressed = true;
            }
            if let Some(delivery) = self.directory.try_next() {
                self.on_directory_delivery(&delivery).await;
                handled += 1;
                progressed = true;
            }
            if let Some(delivery) = self.view.try_next() {
                self.on_view_delivery(&delivery).await;
                handled += 1;
                progressed = true;
            }
            if !progressed {
                return handled;
            }
        }
    }

    pub async fn settle(&mut self) -> usize {
        let mut handled = self.process_pending().await;
        while !self.recounts.is_empty() {
            for task in std::mem::take(&mut self.recounts) {
                if let Err(err) = task.await {
                    warn!(error = %err, "session: recount task failed");
                }
            }
            handled += self.process_pending().await;
        }
        handled
    }

    pub async fn next(&mut self) {
        tokio::select! {
            Some((cid, count)) = self.recount_rx.recv() => self.on_recount(&cid, count),
            Some(delivery) = self.badge_scope.recv() => self.on_badge_delivery(&delivery),
            Some(delivery) = self.directory.next_delivery() => {
                self.on_directory_delivery(&delivery).await;
            }
            Some(delivery) = self.view.next_delivery() => {
                self.on_view_delivery(&delivery).await;
            }
        }
    }

    fn on_badge_delivery(&mut self, delivery: &Delivery) {
        if self.badge.apply_event(&delivery.event) {
            self.ctx
                .emit(SessionEvent::UnreadBadgeChanged(self.badge.has_unread()));
        }
    }

    fn on_recount(&mut self, cid: &Cid, count: u32) {
        if self.directory.apply_recount(cid, count) {
            debug!(%cid, count, "session: unread recounted");
            self.ctx.emit(SessionEvent::DirectoryChanged);
        }
    }

    async fn on_directory_delivery(&mut self, delivery: &Delivery) {
        let active = ActiveState {
            cid: self.view.cid(),
            near_bottom: self.view.anchor.near_bottom(),
        };
        let outcome = self.directory.handle(&self.ctx, delivery, active).await;
        self.apply_directory_outcome(outcome).await;
    }

    async fn apply_directory_outcome(&mut self, outcome: DirectoryOutcome) {
        if outcome.changed {
            self.ctx.emit(SessionEvent::DirectoryChanged);
        }
        for effect in outcome.effects {
            match effect {
                DirectoryEffect::RecountUnread { cid, delay } => self.spawn_recount(cid, delay),
                DirectoryEffect::Reload { hard } => {
                    let selected = self
                        .directory
                        .reload(&self.ctx, hard, self.view.cid())
                        .await;
                    self.ctx.emit(SessionEvent::DirectoryChanged);
                    if let Some(cid) = selected {
                        self.activate(cid).await;
                    }
                }
                DirectoryEffect::ActiveCleared => self.close(),
            }
        }
    }

    fn spawn_recount(&mut self, cid: Cid, delay: std::time::Duration) {
        let backend = self.ctx.backend.clone();
        let completions = self.recount_tx.clone();
        self.recounts.retain(|task| !task.is_finished());
        self.recounts.push(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match backend.count_unread(&cid).await {
                Ok(count) => {
                    if let Err(err) = completions.send((cid, count)) {
                        let (cid, _) = err.0;
                        debug!(%cid, "session: recount finished after the session was dropped");
                    }
                }
                Err(err) => warn!(%cid, error = %err, "session: unread recount failed"),
            }
        }));
    }

    async fn on_view_delivery(&mut self, delivery: &Delivery) {
        let outcome = self
            .view
            .handle(&self.ctx, delivery, &mut *self.viewport)
            .await;
        self.emit_view(outcome);
    }

    pub async fn set_search_text(&mut self, text: &str) {
        if let Some(notice) = self.directory.search.set_text(&self.ctx, text).await {
            self.ctx.notify(notice);
        }
        self.ctx.emit(SessionEvent::SearchChanged);
    }

    pub async fn select_search_result(&mut self, result: SearchResult) {
        let selection = self.directory.search.select(&self.ctx, result).await;
        self.ctx.emit(SessionEvent::SearchChanged);
        match selection {
            Ok(SearchSelection::Activate(cid)) => self.activate(cid).await,
            Ok(SearchSelection::Draft(contact)) => {
                self.close();
                self.directory.open_draft(contact.clone());
                self.ctx.emit(SessionEvent::DraftOpened(contact));
            }
            Ok(SearchSelection::Nothing) => {
                debug!("session: conversation with contact not permitted");
            }
            Err(err) => self
                .ctx
                .notify(Notice::from_error(NoticeContext::Search, &err)),
        }
    }

    pub async fn send_first_message(&mut self, text: &str, files: &[FileUpload]) -> bool {
        let Some(contact) = self.directory.draft().cloned() else {
            return false;
        };
        let created = async {
            let channel = commands::create_private_channel(&self.ctx, &contact.user_uuid).await?;
            commands::send_message(&self.ctx, &channel, text, files, None).await?;
            anyhow::Ok(channel)
        }
        .await;
        match created {
            Ok(channel) => {
                self.activate(channel.cid).await;
                true
            }
            Err(err) => {
                self.ctx
                    .notify(Notice::from_error(NoticeContext::SendMessage, &err));
                false
            }
        }
    }

    pub async fn create_group(&mut self, details: GroupDetails) -> bool {
        match commands::create_group_channel(&self.ctx, details).await {
            Ok(channel) => {
                self.activate(channel.cid).await;
                true
            }
            Err(err) => {
                self.ctx
                    .notify(Notice::from_error(NoticeContext::ChannelAction, &err));
                false
            }
        }
    }

    pub async fn update_group(&mut self, cid: &Cid, patch: ChannelPatch) -> bool {
        match commands::update_group_channel(&self.ctx, cid, patch).await {
            Ok(_) => true,
            Err(err) => {
                self.ctx
                    .notify(Notice::from_error(NoticeContext::ChannelAction, &err));
                false
            }
        }
    }

    pub async fn delete_channel(&mut self, cid: &Cid) -> bool {
        if self.view.cid() == Some(cid) {
            self.close();
        }
        match commands::delete_channel(&self.ctx, cid).await {
            Ok(()) => true,
            Err(err) => {
                self.ctx
                    .notify(Notice::from_error(NoticeContext::ChannelAction, &err));
                false
            }
        }
    }

    pub async fn leave_channel(&mut self, cid: &Cid) -> bool {
        if self.view.cid() == Some(cid) {
            self.close();
        }
        match commands::leave_channel(&self.ctx, cid).await {
            Ok(()) => true,
            Err(err) => {
                self.ctx
                    .notify(Notice::from_error(NoticeContext::ChannelAction, &err));
                false
            }
        }
    }

    pub async fn submit(
        &mut self,
        text: &str,
        new_files: &[FileUpload],
        kept_files: &[Attachment],
    ) -> SubmitOutcome {
        let (submitted, outcome) = self
            .view
            .submit(&self.ctx, text, new_files, kept_files, &mut *self.viewport)
            .await;
        self.emit_view(outcome);
        submitted
    }

    pub async fn load_older(&mut self) {
        let outcome = self
            .view
            .load_older(&self.ctx, &mut *self.viewport)
            .await;
        self.emit_view(outcome);
    }

    pub async fn seek_pinned(&mut self) {
        let outcome = self
            .view
            .seek_pinned(&self.ctx, &mut *self.viewport)
            .await;
        self.emit_view(outcome);
    }

    pub async fn scroll_to(&mut self, scroll_top: f64) {
        self.view
            .on_scroll(&self.ctx, scroll_top, &*self.viewport)
            .await;
    }

    pub async fn set_typing(&self, in_progress: bool) {
        self.view.set_typing(&self.ctx, in_progress).await;
    }

    pub async fn delete_message(&mut self, message: &Message) -> bool {
        self.view.delete_message(&self.ctx, message).await
    }

    pub async fn toggle_pin(&mut self, message: &Message) -> bool {
        self.view.toggle_pin(&self.ctx, message).await
    }

    pub async fn toggle_availability(&mut self) -> bool {
        self.view.toggle_availability(&self.ctx).await
    }

    pub fn logout(mut self) {
        for task in self.recounts.drain(..) {
            task.abort();
        }
        self.view.close();
        self.directory.unmount();
        self.badge_scope.teardown();
        info!(user = %self.ctx.user().id, "session: logged out");
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
