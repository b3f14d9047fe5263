//! Ordered, deduplicated message list for the active channel.

use anyhow::Result;
use chrono::{DateTime, Utc};
use shared::{
    domain::{Cid, MessageId},
    event::{ChatEvent, EventKind},
    protocol::{Channel, Message},
    query::MessagePagination,
};
use tracing::{debug, info};

use crate::backend::MessagingBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelinePhase {
    Idle,
    Loading,
    Loaded,
}

/// Bumped on every activation; completions carrying an older value are
/// discarded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub generation: Generation,
    pub cid: Cid,
    pub pagination: MessagePagination,
}

#[derive(Debug)]
pub enum PageOutcome {
    Applied { added: usize },
    Skipped,
    Discarded,
    Failed(anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineChange {
    Unchanged,
    Changed,
    Appended,
}

impl TimelineChange {
    pub fn changed(self) -> bool {
        self != TimelineChange::Unchanged
    }

    pub fn appended(self) -> bool {
        self == TimelineChange::Appended
    }

    fn from_bool(changed: bool) -> Self {
        if changed {
            TimelineChange::Changed
        } else {
            TimelineChange::Unchanged
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Speculation {
    Send,
    Edit,
}

#[derive(Debug, Clone, PartialEq)]
struct PendingMessage {
    correlation: MessageId,
    message: Message,
    speculation: Speculation,
}

#[derive(Debug)]
pub struct MessageTimeline {
    cid: Option<Cid>,
    generation: Generation,
    phase: TimelinePhase,
    authoritative: Vec<Message>,
    displayed: Vec<Message>,
    pending: Vec<PendingMessage>,
    has_next_page: bool,
    loading_older: bool,
    limit: u32,
}

impl MessageTimeline {
    pub fn new(limit: u32) -> Self {
        Self {
            cid: None,
            generation: Generation::default(),
            phase: TimelinePhase::Idle,
            authoritative: Vec::new(),
            displayed: Vec::new(),
            pending: Vec::new(),
            has_next_page: true,
            loading_older: false,
            limit,
        }
    }

    pub fn cid(&self) -> Option<&Cid> {
        self.cid.as_ref()
    }

    pub fn phase(&self) -> TimelinePhase {
        self.phase
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn messages(&self) -> &[Message] {
        &self.displayed
    }

    pub fn authoritative(&self) -> &[Message] {
        &self.authoritative
    }

    pub fn has_next_page(&self) -> bool {
        self.has_next_page
    }

    pub fn is_loading_older(&self) -> bool {
        self.loading_older
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn find(&self, id: &MessageId) -> Option<&Message> {
        self.displayed.iter().find(|message| &message.id == id)
    }

    pub fn reset(&mut self) {
        self.generation = self.generation.next();
        self.cid = None;
        self.phase = TimelinePhase::Idle;
        self.authoritative.clear();
        self.displayed.clear();
        self.pending.clear();
        self.has_next_page = true;
        self.loading_older = false;
    }

    pub fn begin(&mut self, cid: Cid) -> Generation {
        self.reset();
        info!(%cid, "timeline: loading");
        self.cid = Some(cid);
        self.phase = TimelinePhase::Loading;
        self.generation
    }

    pub fn finish_initial(&mut self, generation: Generation, channel: &mut Channel) -> bool {
        if generation != self.generation || self.phase != TimelinePhase::Loading {
            debug!(?generation, current = ?self.generation, "timeline: stale initial load discarded");
            return false;
        }
        self.authoritative = dedup_by_id(std::mem::take(&mut channel.state.messages));
        self.displayed = self.overlay();
        self.phase = TimelinePhase::Loaded;
        info!(cid = %channel.cid, messages = self.authoritative.len(), "timeline: loaded");
        true
    }

    pub fn fail_initial(&mut self, generation: Generation) {
        if generation == self.generation && self.phase == TimelinePhase::Loading {
            self.phase = TimelinePhase::Idle;
        }
    }

    pub fn prepare_older_page(&mut self) -> Option<PageRequest> {
        if self.phase != TimelinePhase::Loaded || self.loading_older || !self.has_next_page {
            return None;
        }
        let cid = self.cid.clone()?;
        self.loading_older = true;
        Some(PageRequest {
            generation: self.generation,
            cid,
            pagination: MessagePagination::older_than(
                self.limit,
                self.authoritative.first().map(|message| message.id.clone()),
            ),
        })
    }

    pub fn apply_older_page(
        &mut self,
        request: &PageRequest,
        result: Result<Vec<Message>>,
    ) -> PageOutcome {
        if request.generation != self.generation {
            debug!(cid = %request.cid, "timeline: stale page discarded");
            return PageOutcome::Discarded;
        }
        self.loading_older = false;
        let page = match result {
            Ok(page) => page,
            Err(err) => return PageOutcome::Failed(err),
        };
        self.has_next_page = page.len() >= request.pagination.limit as usize;

        let fresh: Vec<Message> = dedup_by_id(page)
            .into_iter()
            .filter(|message| !self.authoritative.iter().any(|known| known.id == message.id))
            .collect();
        let added = fresh.len();
        let displayed_fresh: Vec<Message> = fresh
            .iter()
            .filter(|message| !self.displayed.iter().any(|known| known.id == message.id))
            .cloned()
            .collect();

        self.authoritative.splice(0..0, fresh);
        self.displayed.splice(0..0, displayed_fresh);
        debug!(cid = %request.cid, added, has_next_page = self.has_next_page, "timeline: older page applied");
        PageOutcome::Applied { added }
    }

    pub async fn load_older(&mut self, backend: &dyn MessagingBackend) -> PageOutcome {
        let Some(request) = self.prepare_older_page() else {
            return PageOutcome::Skipped;
        };
        let result = backend
            .query_messages(&request.cid, &request.pagination)
            .await;
        self.apply_older_page(&request, result)
    }

    pub fn apply_event(&mut self, event: &ChatEvent) -> TimelineChange {
        if self.phase != TimelinePhase::Loaded || event.target_cid().as_ref() != self.cid.as_ref() {
            return TimelineChange::Unchanged;
        }
        let Some(message) = &event.message else {
            return TimelineChange::Unchanged;
        };
        let changed = match event.kind {
            EventKind::MessageNew | EventKind::NotificationMessageNew => {
                return self.append(message.clone());
            }
            EventKind::MessageUpdated => self.replace(message.clone()),
            EventKind::MessageDeleted => {
                let deleted_at = message
                    .deleted_at
                    .or(event.created_at)
                    .unwrap_or(message.created_at);
                self.replace(message.clone().into_tombstone(deleted_at))
            }
            _ => false,
        };
        TimelineChange::from_bool(changed)
    }

    /// A redelivered id keeps whatever edits or deletion it has since seen.
    fn append(&mut self, message: Message) -> TimelineChange {
        self.pending.retain(|pending| {
            !(pending.correlation == message.id && pending.speculation == Speculation::Send)
        });
        if self.authoritative.iter().any(|known| known.id == message.id) {
            return TimelineChange::Unchanged;
        }
        self.authoritative.push(message.clone());
        upsert(&mut self.displayed, message);
        TimelineChange::Appended
    }

    fn replace(&mut self, message: Message) -> bool {
        let known = replace_in_place(&mut self.authoritative, &message);
        if !known && !self.displayed.iter().any(|m| m.id == message.id) {
            return false;
        }
        self.pending.retain(|pending| {
            !(pending.correlation == message.id && pending.speculation == Speculation::Edit)
        });
        replace_in_place(&mut self.displayed, &message)
    }

    pub fn stage_send(&mut self, message: Message) {
        debug!(correlation = %message.id, "timeline: staged send");
        self.pending.push(PendingMessage {
            correlation: message.id.clone(),
            message: message.clone(),
            speculation: Speculation::Send,
        });
        upsert(&mut self.displayed, message);
    }

    pub fn stage_edit(&mut self, edited: Message) -> bool {
        if !self.displayed.iter().any(|m| m.id == edited.id) {
            return false;
        }
        debug!(correlation = %edited.id, "timeline: staged edit");
        self.pending.retain(|pending| pending.correlation != edited.id);
        self.pending.push(PendingMessage {
            correlation: edited.id.clone(),
            message: edited.clone(),
            speculation: Speculation::Edit,
        });
        replace_in_place(&mut self.displayed, &edited)
    }

    pub fn confirm(&mut self, acknowledged: Message) -> TimelineChange {
        let Some(index) = self
            .pending
            .iter()
            .position(|pending| pending.correlation == acknowledged.id)
        else {
            return TimelineChange::Unchanged;
        };
        let pending = self.pending.remove(index);
        let changed = match pending.speculation {
            Speculation::Send => {
                upsert(&mut self.authoritative, acknowledged.clone());
                upsert(&mut self.displayed, acknowledged)
            }
            Speculation::Edit => {
                replace_in_place(&mut self.authoritative, &acknowledged);
                replace_in_place(&mut self.displayed, &acknowledged)
            }
        };
        TimelineChange::from_bool(changed)
    }

    pub fn discard(&mut self, correlation: &MessageId) -> TimelineChange {
        let before = self.pending.len();
        self.pending.retain(|pending| &pending.correlation != correlation);
        if before == self.pending.len() {
            return TimelineChange::Unchanged;
        }
        debug!(%correlation, "timeline: speculation discarded");
        TimelineChange::from_bool(self.reconcile())
    }

    pub fn reconcile(&mut self) -> bool {
        let expected = self.overlay();
        if expected == self.displayed {
            return false;
        }
        self.displayed = expected;
        true
    }

    fn overlay(&self) -> Vec<Message> {
        let mut list = self.authoritative.clone();
        for pending in &self.pending {
            match pending.speculation {
                Speculation::Send => {
                    if !list.iter().any(|m| m.id == pending.correlation) {
                        list.push(pending.message.clone());
                    }
                }
                Speculation::Edit => {
                    replace_in_place(&mut list, &pending.message);
                }
            }
        }
        list
    }

    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.authoritative.last().map(|message| message.created_at)
    }
}

fn upsert(list: &mut Vec<Message>, message: Message) -> bool {
    match list.iter_mut().find(|known| known.id == message.id) {
        Some(existing) if *existing == message => false,
        Some(existing) => {
            *existing = message;
            true
        }
        None => {
            list.push(message);
            true
        }
    }
}

fn replace_in_place(list: &mut [Message], message: &Message) -> bool {
    match list.iter_mut().find(|known| known.id == message.id) {
        Some(existing) if existing == message => false,
        Some(existing) => {
            *existing = message.clone();
            true
        }
        None => false,
    }
}

fn dedup_by_id(messages: Vec<Message>) -> Vec<Message> {
    let mut unique: Vec<Message> = Vec::with_capacity(messages.len());
    for message in messages {
        upsert(&mut unique, message);
    }
    unique
}

#[cfg(test)]
#[path = "tests/timeline_tests.rs"]
mod tests;
