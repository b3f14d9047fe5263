use anyhow::Result;
use futures::future::join;
use shared::{
    domain::{ChannelType, Cid},
    protocol::{Channel, ContactResult},
    query::{ChannelFilters, ChannelOptions, ChannelSort, QueryFilter},
};
use tracing::{debug, info};

use crate::{
    context::SessionContext,
    notice::{Notice, NoticeContext},
    presence,
};

pub fn name_matches(name: &str, text: &str) -> bool {
    let text = text.to_lowercase();
    name.to_lowercase()
        .split(' ')
        .any(|word| word.starts_with(&text))
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchResult {
    Channel(Box<Channel>),
    Contact(ContactResult),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchSelection {
    Activate(Cid),
    Draft(ContactResult),
    Nothing,
}

#[derive(Debug, Default)]
pub struct ChannelSearch {
    text: String,
    searching: bool,
    channels: Vec<Channel>,
    contacts: Vec<ContactResult>,
}

impl ChannelSearch {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_active(&self) -> bool {
        !self.text.is_empty()
    }

    pub fn is_searching(&self) -> bool {
        self.searching
    }

    pub fn results(&self) -> Vec<SearchResult> {
        self.channels
            .iter()
            .cloned()
            .map(|channel| SearchResult::Channel(Box::new(channel)))
            .chain(self.contacts.iter().cloned().map(SearchResult::Contact))
            .collect()
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.searching = false;
        self.channels.clear();
        self.contacts.clear();
    }

    pub async fn set_text(&mut self, ctx: &SessionContext, text: &str) -> Option<Notice> {
        if text.is_empty() {
            self.clear();
            return None;
        }
        self.text = text.to_string();
        self.searching = true;
        debug!(text, "search: started");

        let (contacts, channels) = join(search_contacts(ctx, text), search_channels(ctx, text)).await;
        self.searching = false;

        // A failed half is emptied so it never shows results for older text.
        let mut notice = None;
        match contacts {
            Ok(contacts) => self.contacts = contacts,
            Err(err) => {
                self.contacts.clear();
                notice = Some(Notice::from_error(NoticeContext::Search, &err));
            }
        }
        match channels {
            Ok(channels) => self.channels = channels,
            Err(err) => {
                self.channels.clear();
                notice.get_or_insert_with(|| Notice::from_error(NoticeContext::Search, &err));
            }
        }
        info!(
            text,
            channels = self.channels.len(),
            contacts = self.contacts.len(),
            "search: results updated"
        );
        notice
    }

    pub async fn select(
        &mut self,
        ctx: &SessionContext,
        result: SearchResult,
    ) -> Result<SearchSelection> {
        let selection = match result {
            SearchResult::Channel(channel) => SearchSelection::Activate(channel.cid),
            SearchResult::Contact(contact) => select_contact(ctx, contact).await?,
        };
        self.clear();
        Ok(selection)
    }
}

async fn search_contacts(ctx: &SessionContext, text: &str) -> Result<Vec<ContactResult>> {
    let user = ctx.user();
    if user.role.is_industry_professional() {
        ctx.contacts.search_actors(text).await
    } else if !ctx.is_minor() {
        ctx.contacts.search_friends(&user.id, text).await
    } else {
        Ok(Vec::new())
    }
}

fn search_options(limit: u32) -> ChannelOptions {
    ChannelOptions {
        limit,
        offset: 0,
        watch: false,
        presence: false,
        state: true,
        member_limit: None,
        message_limit: None,
    }
}

async fn search_channels(ctx: &SessionContext, text: &str) -> Result<Vec<Channel>> {
    let viewer = &ctx.user().id;
    let options = search_options(ctx.settings.search_result_limit);
    let sort = ChannelSort::default();

    let private_filters = ChannelFilters {
        member_name: Some(QueryFilter::autocomplete(text)),
        member_count: Some(QueryFilter::eq(2)),
        ..ChannelFilters::member_of(viewer)
    };
    let group_filters = ChannelFilters {
        name: Some(QueryFilter::autocomplete(text)),
        is_group: Some(QueryFilter::eq(true)),
        ..ChannelFilters::member_of(viewer)
    };

    let mut found: Vec<Channel> = ctx
        .backend
        .query_channels(&private_filters, &sort, &options)
        .await?
        .into_iter()
        .filter(|channel| {
            presence::companion(channel, viewer).is_some_and(|companion| {
                companion.user.role.is_industry_professional()
                    && name_matches(&companion.user.name, text)
            })
        })
        .collect();
    found.extend(
        ctx.backend
            .query_channels(&group_filters, &sort, &options)
            .await?,
    );
    Ok(found)
}

async fn select_contact(ctx: &SessionContext, contact: ContactResult) -> Result<SearchSelection> {
    let user = ctx.user();
    let filters = ChannelFilters {
        channel_type: Some(QueryFilter::eq(ChannelType::Messaging)),
        members: Some(QueryFilter::eq_all(vec![
            user.id.clone(),
            contact.user_uuid.clone(),
        ])),
        member_count: Some(QueryFilter::eq(2)),
        is_group: Some(QueryFilter::exists(false)),
        ..ChannelFilters::default()
    };
    let existing = ctx
        .backend
        .query_channels(&filters, &ChannelSort::default(), &search_options(1))
        .await?;
    let permitted = user.role.is_industry_professional()
        || ctx.contacts.is_friend(&contact.actor_id).await?;

    Ok(match existing.into_iter().next() {
        _ if !permitted => SearchSelection::Nothing,
        Some(channel) => SearchSelection::Activate(channel.cid),
        None => SearchSelection::Draft(contact),
    })
}

#[cfg(test)]
#[path = "tests/search_tests.rs"]
mod tests;
