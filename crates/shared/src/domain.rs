use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(ChannelId);
id_newtype!(MessageId);

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    #[default]
    Messaging,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Messaging => "messaging",
        }
    }
}

impl FromStr for ChannelType {
    type Err = CidParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "messaging" => Ok(ChannelType::Messaging),
            other => Err(CidParseError::UnknownChannelType(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CidParseError {
    #[error("cid must be formatted as <type>:<id>, got {0:?}")]
    Malformed(String),
    #[error("unknown channel type {0:?}")]
    UnknownChannelType(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cid {
    pub channel_type: ChannelType,
    pub id: ChannelId,
}

impl Cid {
    pub fn new(channel_type: ChannelType, id: ChannelId) -> Self {
        Self { channel_type, id }
    }

    pub fn messaging(id: impl Into<String>) -> Self {
        Self::new(ChannelType::Messaging, ChannelId::new(id))
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel_type.as_str(), self.id)
    }
}

impl FromStr for Cid {
    type Err = CidParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (channel_type, id) = value
            .split_once(':')
            .filter(|(_, id)| !id.is_empty())
            .ok_or_else(|| CidParseError::Malformed(value.to_string()))?;
        Ok(Self::new(channel_type.parse()?, ChannelId::new(id)))
    }
}

impl TryFrom<String> for Cid {
    type Error = CidParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Cid> for String {
    fn from(value: Cid) -> Self {
        value.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    CastingDirector,
    Producer,
    Agent,
    Actor,
    #[default]
    User,
}

impl UserRole {
    pub fn is_industry_professional(&self) -> bool {
        matches!(
            self,
            UserRole::CastingDirector | UserRole::Agent | UserRole::Producer
        )
    }

    pub fn readable(&self) -> Option<&'static str> {
        match self {
            UserRole::CastingDirector => Some("Casting Director"),
            UserRole::Producer => Some("Producer"),
            UserRole::Agent => Some("Agent"),
            UserRole::Actor | UserRole::User => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MemberRole {
    #[default]
    #[serde(rename = "channel_member")]
    Member,
    #[serde(rename = "channel_moderator")]
    Moderator,
    #[serde(rename = "channel_member_disabled_actor")]
    DisabledActor,
}

impl MemberRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemberRole::Member => "channel_member",
            MemberRole::Moderator => "channel_moderator",
            MemberRole::DisabledActor => "channel_member_disabled_actor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    Video,
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    #[default]
    Regular,
    Deleted,
    Ephemeral,
    Error,
    Reply,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageCustomType {
    #[default]
    Default,
    System,
}
