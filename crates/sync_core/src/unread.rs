use shared::{
    domain::UserId,
    event::{ChatEvent, EventKind},
    protocol::ChatUser,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnreadUpdate {
    Recount,
    Increment,
    Reset,
    Keep,
}

pub fn on_new_message(near_bottom: bool, showing: u32, own_message: bool) -> UnreadUpdate {
    if !near_bottom {
        UnreadUpdate::Recount
    } else if showing > 0 && !own_message {
        UnreadUpdate::Increment
    } else if own_message {
        UnreadUpdate::Reset
    } else {
        UnreadUpdate::Keep
    }
}

pub fn directory_should_recount(is_active: bool, near_bottom: bool) -> bool {
    !is_active || !near_bottom
}

pub fn advance_authoritative(counter: &mut u32, event: &ChatEvent, viewer: &UserId) -> bool {
    let before = *counter;
    match event.kind {
        EventKind::MessageNew | EventKind::NotificationMessageNew => {
            if let Some(count) = event.unread_count {
                *counter = count;
            } else if let Some(message) = &event.message {
                if &message.user.id != viewer {
                    *counter = counter.saturating_add(1);
                }
            }
        }
        EventKind::NotificationMarkRead => *counter = event.unread_count.unwrap_or(0),
        _ => {}
    }
    before != *counter
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimelineUnread {
    count: u32,
}

impl TimelineUnread {
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn reset_from(&mut self, authoritative: u32) {
        self.count = authoritative;
    }

    pub fn apply(&mut self, update: UnreadUpdate, authoritative: u32) {
        match update {
            UnreadUpdate::Recount => self.count = authoritative,
            UnreadUpdate::Increment => self.count = self.count.saturating_add(1),
            UnreadUpdate::Reset => self.count = 0,
            UnreadUpdate::Keep => {}
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnreadBadge {
    has_unread: bool,
}

impl UnreadBadge {
    pub fn from_user(user: &ChatUser) -> Self {
        Self {
            has_unread: user.unread_channels > 0,
        }
    }

    pub fn has_unread(&self) -> bool {
        self.has_unread
    }

    pub fn apply_event(&mut self, event: &ChatEvent) -> bool {
        let Some(unread_channels) = event.unread_channels else {
            return false;
        };
        let next = unread_channels > 0;
        let changed = next != self.has_unread;
        self.has_unread = next;
        changed
    }
}

#[cfg(test)]
#[path = "tests/unread_tests.rs"]
mod tests;
