use shared::{
    domain::{MessageId, UserId},
    protocol::Message,
};

use crate::config::SyncSettings;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScrollMetrics {
    pub content_height: f64,
    pub visible_height: f64,
}

impl ScrollMetrics {
    fn max_scroll_top(&self) -> f64 {
        (self.content_height - self.visible_height).max(0.0)
    }
}

pub trait ScrollViewport {
    fn metrics(&self) -> ScrollMetrics;
    fn element_offset(&self, id: &MessageId) -> Option<f64>;
    fn is_foreground(&self) -> bool;
    fn sync(&mut self, _messages: &[Message]) {}
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScrollAction {
    ScrollBy(f64),
    ScrollTo(f64),
    ScrollToBottom,
    ShowNewMessages,
}

enum ListChange {
    Prepended,
    Appended,
    Other,
}

#[derive(Debug, Clone)]
pub struct ScrollAnchor {
    previous_ids: Option<Vec<MessageId>>,
    previous_metrics: ScrollMetrics,
    scroll_top: f64,
    threshold: f64,
    pinned_offset: f64,
    pinned_target: Option<MessageId>,
    near_bottom: bool,
    has_new_messages: bool,
}

impl ScrollAnchor {
    pub fn new(settings: &SyncSettings) -> Self {
        Self {
            previous_ids: None,
            previous_metrics: ScrollMetrics::default(),
            scroll_top: 0.0,
            threshold: f64::from(settings.scrolled_up_threshold_px),
            pinned_offset: f64::from(settings.pinned_seek_offset_px),
            pinned_target: None,
            near_bottom: true,
            has_new_messages: false,
        }
    }

    pub fn near_bottom(&self) -> bool {
        self.near_bottom
    }

    pub fn has_new_messages(&self) -> bool {
        self.has_new_messages
    }

    pub fn pinned_target(&self) -> Option<&MessageId> {
        self.pinned_target.as_ref()
    }

    pub fn scroll_top(&self) -> f64 {
        self.scroll_top
    }

    pub fn on_channel_changed(&mut self, viewport: &dyn ScrollViewport) -> ScrollAction {
        self.previous_ids = None;
        self.pinned_target = None;
        self.has_new_messages = false;
        self.near_bottom = true;
        self.previous_metrics = viewport.metrics();
        self.scroll_to_bottom(self.previous_metrics)
    }

    pub fn on_scroll(&mut self, scroll_top: f64, metrics: ScrollMetrics) {
        self.scroll_top = scroll_top;
        self.near_bottom = metrics.content_height - (scroll_top + metrics.visible_height)
            < self.threshold;
        if self.near_bottom {
            self.has_new_messages = false;
        }
    }

    pub fn on_messages_changed(
        &mut self,
        messages: &[Message],
        viewer: &UserId,
        viewport: &dyn ScrollViewport,
    ) -> Vec<ScrollAction> {
        let metrics = viewport.metrics();
        let mut actions = Vec::new();

        match self.classify(messages) {
            ListChange::Prepended => {
                let delta = metrics.content_height - self.previous_metrics.content_height;
                self.scroll_top += delta;
                actions.push(ScrollAction::ScrollBy(delta));
            }
            ListChange::Appended => {
                let was_at_bottom = self.previous_metrics.content_height
                    - self.previous_metrics.visible_height
                    - self.scroll_top
                    < self.threshold;
                let own = messages
                    .last()
                    .is_some_and(|message| &message.user.id == viewer);
                if own || (was_at_bottom && viewport.is_foreground()) {
                    actions.push(self.scroll_to_bottom(metrics));
                } else {
                    self.has_new_messages = true;
                    actions.push(ScrollAction::ShowNewMessages);
                }
            }
            ListChange::Other => {}
        }

        self.previous_ids = Some(messages.iter().map(|m| m.id.clone()).collect());
        self.previous_metrics = metrics;

        if self.pinned_target.is_some() {
            actions.push(self.resolve_seek(viewport));
        }
        actions
    }

    fn classify(&self, messages: &[Message]) -> ListChange {
        let Some(previous) = &self.previous_ids else {
            return ListChange::Other;
        };
        if previous.len() >= messages.len() {
            return ListChange::Other;
        }
        let same_last = previous.last() == messages.last().map(|m| &m.id);
        let same_first = previous.first() == messages.first().map(|m| &m.id);
        match (same_last, same_first) {
            (true, false) => ListChange::Prepended,
            (true, true) => ListChange::Other,
            (false, _) => ListChange::Appended,
        }
    }

    pub fn seek(&mut self, target: MessageId, viewport: &dyn ScrollViewport) -> ScrollAction {
        self.pinned_target = Some(target);
        self.resolve_seek(viewport)
    }

    pub fn cancel_seek(&mut self) {
        self.pinned_target = None;
    }

    fn resolve_seek(&mut self, viewport: &dyn ScrollViewport) -> ScrollAction {
        let offset = self
            .pinned_target
            .as_ref()
            .and_then(|target| viewport.element_offset(target));
        match offset {
            Some(offset) => {
                self.pinned_target = None;
                self.scroll_to((offset - self.pinned_offset).max(0.0), viewport.metrics())
            }
            None => self.scroll_to(0.0, viewport.metrics()),
        }
    }

    fn scroll_to(&mut self, top: f64, metrics: ScrollMetrics) -> ScrollAction {
        self.on_scroll(top.min(metrics.max_scroll_top()), metrics);
        ScrollAction::ScrollTo(top)
    }

    fn scroll_to_bottom(&mut self, metrics: ScrollMetrics) -> ScrollAction {
        self.scroll_top = metrics.max_scroll_top();
        self.near_bottom = true;
        self.has_new_messages = false;
        ScrollAction::ScrollToBottom
    }
}

#[derive(Debug, Clone)]
pub struct RowViewport {
    pub row_height: f64,
    pub visible_height: f64,
    pub foreground: bool,
    rows: Vec<MessageId>,
}

impl RowViewport {
    pub fn new(row_height: f64, visible_height: f64) -> Self {
        Self {
            row_height,
            visible_height,
            foreground: true,
            rows: Vec::new(),
        }
    }
}

impl ScrollViewport for RowViewport {
    fn metrics(&self) -> ScrollMetrics {
        ScrollMetrics {
            content_height: self.rows.len() as f64 * self.row_height,
            visible_height: self.visible_height,
        }
    }

    fn element_offset(&self, id: &MessageId) -> Option<f64> {
        self.rows
            .iter()
            .position(|row| row == id)
            .map(|index| index as f64 * self.row_height)
    }

    fn is_foreground(&self) -> bool {
        self.foreground
    }

    fn sync(&mut self, messages: &[Message]) {
        self.rows = messages.iter().map(|m| m.id.clone()).collect();
    }
}

#[cfg(test)]
#[path = "tests/scroll_tests.rs"]
mod tests;
