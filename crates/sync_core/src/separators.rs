use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use shared::{domain::MessageId, protocol::Message};

#[derive(Debug, Clone, PartialEq)]
pub enum TimelineEntry {
    Message(Message),
    DateSeparator { id: MessageId, date: DateTime<Utc> },
    UnreadSeparator { id: MessageId, date: DateTime<Utc> },
}

impl TimelineEntry {
    pub fn is_separator(&self) -> bool {
        !matches!(self, TimelineEntry::Message(_))
    }

    pub fn message(&self) -> Option<&Message> {
        match self {
            TimelineEntry::Message(message) => Some(message),
            _ => None,
        }
    }
}

pub fn process_message_separators(messages: &[Message], unread_count: usize) -> Vec<TimelineEntry> {
    process_message_separators_in(messages, unread_count, &Local)
}

pub fn process_message_separators_in<Tz: TimeZone>(
    messages: &[Message],
    unread_count: usize,
    tz: &Tz,
) -> Vec<TimelineEntry> {
    let day = |message: &Message| -> NaiveDate { message.created_at.with_timezone(tz).date_naive() };
    let total = messages.len();
    let mut entries = Vec::with_capacity(total + 2);

    for (index, message) in messages.iter().enumerate() {
        if total - index == unread_count {
            entries.push(TimelineEntry::UnreadSeparator {
                id: message.id.clone(),
                date: message.created_at,
            });
        }

        let new_day = index == 0 || day(&messages[index - 1]) != day(message);
        let after_separator = entries.last().is_some_and(TimelineEntry::is_separator);
        if new_day && !after_separator {
            entries.push(TimelineEntry::DateSeparator {
                id: message.id.clone(),
                date: message.created_at,
            });
        }

        entries.push(TimelineEntry::Message(message.clone()));
    }
    entries
}

pub fn strip_separators(entries: Vec<TimelineEntry>) -> Vec<Message> {
    entries
        .into_iter()
        .filter_map(|entry| match entry {
            TimelineEntry::Message(message) => Some(message),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
#[path = "tests/separators_tests.rs"]
mod tests;
