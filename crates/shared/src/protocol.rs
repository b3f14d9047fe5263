use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    AttachmentKind, ChannelId, ChannelType, Cid, MemberRole, MessageCustomType, MessageId,
    MessageType, UserId, UserRole,
};

/// Backend timestamps arrive either as RFC 3339 strings or epoch milliseconds;
/// both are parsed into `DateTime<Utc>` before anything is stored.
pub mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::{de::Error as _, Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimestamp {
        Millis(i64),
        Text(String),
    }

    pub fn parse(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        DateTime::parse_from_rfc3339(raw).map(|parsed| parsed.with_timezone(&Utc))
    }

    fn normalize(raw: RawTimestamp) -> Result<DateTime<Utc>, String> {
        match raw {
            RawTimestamp::Millis(millis) => DateTime::from_timestamp_millis(millis)
                .ok_or_else(|| format!("timestamp {millis}ms is out of range")),
            RawTimestamp::Text(text) => {
                parse(&text).map_err(|err| format!("invalid timestamp {text:?}: {err}"))
            }
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        normalize(RawTimestamp::deserialize(deserializer)?).map_err(D::Error::custom)
    }

    pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<RawTimestamp>::deserialize(deserializer)?
            .map(normalize)
            .transpose()
            .map_err(D::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatUser {
    pub id: UserId,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub role: UserRole,
    #[serde(
        default,
        deserialize_with = "timestamp::deserialize_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_active: Option<DateTime<Utc>>,
    #[serde(rename = "customId", default, skip_serializing_if = "Option::is_none")]
    pub custom_id: Option<String>,
    #[serde(default)]
    pub unread_channels: u32,
    #[serde(
        rename = "customGenderPronoun",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub custom_gender_pronoun: Option<String>,
}

impl ChatUser {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: UserRole) -> Self {
        Self {
            id: UserId::new(id),
            name: name.into(),
            image: None,
            online: false,
            role,
            last_active: None,
            custom_id: None,
            unread_channels: 0,
            custom_gender_pronoun: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMembership {
    #[serde(default)]
    pub channel_role: MemberRole,
    pub user: ChatUser,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub is_moderator: bool,
}

impl ChannelMembership {
    pub fn new(user: ChatUser, channel_role: MemberRole) -> Self {
        Self {
            user_id: Some(user.id.clone()),
            is_moderator: channel_role == MemberRole::Moderator,
            channel_role,
            user,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelData {
    pub id: ChannelId,
    #[serde(rename = "type", default)]
    pub channel_type: ChannelType,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "isGroup", default)]
    pub is_group: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(
        default,
        deserialize_with = "timestamp::deserialize_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_message_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        deserialize_with = "timestamp::deserialize_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        deserialize_with = "timestamp::deserialize_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(rename = "unavailableForActors", default)]
    pub unavailable_for_actors: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelState {
    #[serde(default)]
    pub members: BTreeMap<UserId, ChannelMembership>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub membership: Option<ChannelMembership>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub pinned_messages: Vec<Message>,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub typing: BTreeSet<UserId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub cid: Cid,
    pub data: ChannelData,
    #[serde(default)]
    pub state: ChannelState,
}

impl Channel {
    pub fn new(cid: Cid, data: ChannelData) -> Self {
        Self {
            id: cid.id.clone(),
            cid,
            data,
            state: ChannelState::default(),
        }
    }

    pub fn is_group(&self) -> bool {
        self.data.is_group
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.state.messages.last()
    }

    pub fn member_count(&self) -> usize {
        self.state.members.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<AttachmentKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
}

impl Attachment {
    pub fn uploaded(kind: AttachmentKind, url: impl Into<String>, title: &str, size: u64) -> Self {
        let url = url.into();
        let (image_url, asset_url) = match kind {
            AttachmentKind::Image => (Some(url), None),
            AttachmentKind::Video | AttachmentKind::File => (None, Some(url)),
        };
        Self {
            kind: Some(kind),
            image_url,
            asset_url,
            title: Some(title.to_string()),
            file_size: Some(size),
            ..Self::default()
        }
    }

    pub fn is_link_preview(&self) -> bool {
        self.title_link.is_some()
    }

    pub fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref().filter(|url| !url.is_empty())
    }

    pub fn asset_url(&self) -> Option<&str> {
        self.asset_url.as_deref().filter(|url| !url.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub edited: bool,
    #[serde(default)]
    pub pinned: bool,
    #[serde(
        default,
        deserialize_with = "timestamp::deserialize_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub pinned_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(rename = "type", default)]
    pub message_type: MessageType,
    #[serde(rename = "customType", default)]
    pub custom_type: MessageCustomType,
    pub user: ChatUser,
    #[serde(deserialize_with = "timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
    #[serde(
        default,
        deserialize_with = "timestamp::deserialize_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(
        default,
        deserialize_with = "timestamp::deserialize_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(
        id: impl Into<String>,
        user: ChatUser,
        text: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: MessageId::new(id),
            attachments: Vec::new(),
            edited: false,
            pinned: false,
            pinned_at: None,
            text: Some(text.into()),
            message_type: MessageType::Regular,
            custom_type: MessageCustomType::Default,
            user,
            created_at,
            updated_at: None,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.message_type == MessageType::Deleted || self.deleted_at.is_some()
    }

    pub fn into_tombstone(mut self, deleted_at: DateTime<Utc>) -> Self {
        self.message_type = MessageType::Deleted;
        self.text = None;
        self.attachments.clear();
        self.pinned = false;
        self.pinned_at = None;
        self.deleted_at.get_or_insert(deleted_at);
        self
    }

    pub fn apply_patch(&mut self, patch: &MessagePatch) {
        if let Some(text) = &patch.text {
            self.text = Some(text.clone());
        }
        if let Some(attachments) = &patch.attachments {
            self.attachments = attachments.clone();
        }
        if let Some(edited) = patch.edited {
            self.edited = edited;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SendMessageRequest {
    /// Client-generated id; the backend keeps it so event echoes can be
    /// matched to the optimistic entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(rename = "customType", default)]
    pub custom_type: MessageCustomType,
    #[serde(default)]
    pub silent: bool,
}

impl SendMessageRequest {
    pub fn system(text: impl Into<String>, silent: bool) -> Self {
        Self {
            id: None,
            text: text.into(),
            attachments: Vec::new(),
            custom_type: MessageCustomType::System,
            silent,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessagePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Attachment>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(
        rename = "unavailableForActors",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub unavailable_for_actors: Option<bool>,
}

impl ChannelPatch {
    pub fn apply_to(&self, data: &mut ChannelData) {
        if let Some(name) = &self.name {
            data.name = name.clone();
        }
        if let Some(description) = &self.description {
            data.description = description.clone();
        }
        if let Some(image) = &self.image {
            data.image = Some(image.clone());
        }
        if let Some(flag) = self.unavailable_for_actors {
            data.unavailable_for_actors = flag;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateChannelData {
    #[serde(default)]
    pub members: Vec<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(rename = "isGroup", default, skip_serializing_if = "Option::is_none")]
    pub is_group: Option<bool>,
    #[serde(
        rename = "unavailableForActors",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub unavailable_for_actors: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<UserRole>,
    #[serde(rename = "customId", default, skip_serializing_if = "Option::is_none")]
    pub custom_id: Option<String>,
    #[serde(
        rename = "customGenderPronoun",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub custom_gender_pronoun: Option<String>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type: None,
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUploadResponse {
    pub file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactResult {
    pub actor_id: String,
    pub user_uuid: UserId,
    #[serde(default)]
    pub friendship_id: Option<String>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub profile_picture_link: Option<String>,
    #[serde(default)]
    pub gender_pronoun: Option<String>,
}

impl ContactResult {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}
