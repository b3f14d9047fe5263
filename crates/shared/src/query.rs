use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::domain::{ChannelId, ChannelType, MessageId, UserId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T: PartialEq> OneOrMany<T> {
    pub fn contains(&self, value: &T) -> bool {
        match self {
            OneOrMany::One(single) => single == value,
            OneOrMany::Many(values) => values.contains(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct QueryFilter<T> {
    #[serde(rename = "$eq", default, skip_serializing_if = "Option::is_none")]
    pub eq: Option<OneOrMany<T>>,
    #[serde(rename = "$ne", default, skip_serializing_if = "Option::is_none")]
    pub ne: Option<T>,
    #[serde(rename = "$gt", default, skip_serializing_if = "Option::is_none")]
    pub gt: Option<T>,
    #[serde(rename = "$gte", default, skip_serializing_if = "Option::is_none")]
    pub gte: Option<T>,
    #[serde(rename = "$lt", default, skip_serializing_if = "Option::is_none")]
    pub lt: Option<T>,
    #[serde(rename = "$lte", default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<T>,
    #[serde(rename = "$in", default, skip_serializing_if = "Option::is_none")]
    pub any_of: Option<Vec<T>>,
    #[serde(rename = "$nin", default, skip_serializing_if = "Option::is_none")]
    pub none_of: Option<Vec<T>>,
    #[serde(rename = "$exists", default, skip_serializing_if = "Option::is_none")]
    pub exists: Option<bool>,
    #[serde(
        rename = "$autocomplete",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub autocomplete: Option<String>,
}

impl<T> Default for QueryFilter<T> {
    fn default() -> Self {
        Self {
            eq: None,
            ne: None,
            gt: None,
            gte: None,
            lt: None,
            lte: None,
            any_of: None,
            none_of: None,
            exists: None,
            autocomplete: None,
        }
    }
}

impl<T> QueryFilter<T> {
    pub fn eq(value: T) -> Self {
        Self {
            eq: Some(OneOrMany::One(value)),
            ..Self::default()
        }
    }

    pub fn eq_all(values: Vec<T>) -> Self {
        Self {
            eq: Some(OneOrMany::Many(values)),
            ..Self::default()
        }
    }

    pub fn any_of(values: Vec<T>) -> Self {
        Self {
            any_of: Some(values),
            ..Self::default()
        }
    }

    pub fn ne(value: T) -> Self {
        Self {
            ne: Some(value),
            ..Self::default()
        }
    }

    pub fn exists(flag: bool) -> Self {
        Self {
            exists: Some(flag),
            ..Self::default()
        }
    }

    pub fn autocomplete(text: impl Into<String>) -> Self {
        Self {
            autocomplete: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn between(lower: Option<T>, upper: Option<T>) -> Self {
        Self {
            gte: lower,
            lte: upper,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<QueryFilter<ChannelId>>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub channel_type: Option<QueryFilter<ChannelType>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub members: Option<QueryFilter<UserId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<QueryFilter<String>>,
    #[serde(rename = "isGroup", default, skip_serializing_if = "Option::is_none")]
    pub is_group: Option<QueryFilter<bool>>,
    #[serde(
        rename = "member.user.name",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub member_name: Option<QueryFilter<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_count: Option<QueryFilter<u32>>,
}

impl ChannelFilters {
    pub fn member_of(user_id: &UserId) -> Self {
        Self {
            channel_type: Some(QueryFilter::eq(ChannelType::Messaging)),
            members: Some(QueryFilter::any_of(vec![user_id.clone()])),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: ChannelId) -> Self {
        self.id = Some(QueryFilter::eq(id));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl Serialize for SortDirection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i8(match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        })
    }
}

impl<'de> Deserialize<'de> for SortDirection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match i8::deserialize(deserializer)? {
            value if value >= 0 => Ok(SortDirection::Asc),
            _ => Ok(SortDirection::Desc),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSort {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<SortDirection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<SortDirection>,
}

impl Default for ChannelSort {
    fn default() -> Self {
        Self {
            last_message_at: Some(SortDirection::Desc),
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelOptions {
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    #[serde(default)]
    pub watch: bool,
    #[serde(default)]
    pub presence: bool,
    #[serde(default)]
    pub state: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_limit: Option<u32>,
}

impl ChannelOptions {
    pub fn watched_page(limit: u32, offset: u32) -> Self {
        Self {
            limit,
            offset,
            watch: true,
            presence: true,
            state: true,
            member_limit: None,
            message_limit: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePagination {
    pub limit: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_lt: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_gt: Option<MessageId>,
}

impl MessagePagination {
    pub fn older_than(limit: u32, id_lt: Option<MessageId>) -> Self {
        Self {
            limit,
            id_lt,
            id_gt: None,
        }
    }
}
