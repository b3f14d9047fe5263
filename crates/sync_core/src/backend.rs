use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::{
    domain::{ChannelId, ChannelType, Cid, MemberRole, MessageId, UserId},
    protocol::{
        Channel, ChannelPatch, ChatUser, ContactResult, CreateChannelData, FileUpload,
        FileUploadResponse, Message, MessagePatch, SendMessageRequest, UserPatch,
    },
    query::{ChannelFilters, ChannelOptions, ChannelSort, MessagePagination},
};

/// Remote real-time messaging service. Mutations may be echoed back as push
/// events; callers must not assume the echo arrives before or after the
/// returned acknowledgment.
#[async_trait]
pub trait MessagingBackend: Send + Sync {
    async fn current_user(&self) -> Result<ChatUser>;
    async fn partial_update_user(&self, user_id: &UserId, set: UserPatch) -> Result<ChatUser>;

    async fn query_channels(
        &self,
        filters: &ChannelFilters,
        sort: &ChannelSort,
        options: &ChannelOptions,
    ) -> Result<Vec<Channel>>;
    async fn create_channel(
        &self,
        channel_type: ChannelType,
        id: Option<ChannelId>,
        data: CreateChannelData,
    ) -> Result<Channel>;
    async fn watch_channel(&self, cid: &Cid) -> Result<Channel>;
    async fn query_messages(
        &self,
        cid: &Cid,
        pagination: &MessagePagination,
    ) -> Result<Vec<Message>>;

    async fn send_message(&self, cid: &Cid, request: SendMessageRequest) -> Result<Message>;
    async fn send_file(&self, cid: &Cid, file: &FileUpload) -> Result<FileUploadResponse>;
    async fn send_image(&self, cid: &Cid, file: &FileUpload) -> Result<FileUploadResponse>;
    async fn delete_file(&self, cid: &Cid, url: &str) -> Result<()>;
    async fn delete_image(&self, cid: &Cid, url: &str) -> Result<()>;

    async fn update_channel_partial(&self, cid: &Cid, set: ChannelPatch) -> Result<Channel>;
    async fn delete_channel(&self, cid: &Cid) -> Result<()>;
    async fn remove_members(
        &self,
        cid: &Cid,
        user_ids: &[UserId],
        message: Option<SendMessageRequest>,
    ) -> Result<()>;
    async fn add_moderators(&self, cid: &Cid, user_ids: &[UserId]) -> Result<()>;
    async fn demote_moderators(&self, cid: &Cid, user_ids: &[UserId]) -> Result<()>;
    async fn update_member_role(&self, cid: &Cid, user_id: &UserId, role: MemberRole)
        -> Result<()>;

    async fn mark_read(&self, cid: &Cid) -> Result<()>;
    async fn count_unread(&self, cid: &Cid) -> Result<u32>;
    async fn keystroke(&self, cid: &Cid) -> Result<()>;
    async fn stop_typing(&self, cid: &Cid) -> Result<()>;

    async fn partial_update_message(&self, id: &MessageId, set: MessagePatch) -> Result<Message>;
    async fn delete_message(&self, id: &MessageId) -> Result<Message>;
    async fn pin_message(&self, id: &MessageId) -> Result<Message>;
    async fn unpin_message(&self, id: &MessageId) -> Result<Message>;
}

#[async_trait]
pub trait ContactDirectory: Send + Sync {
    async fn search_actors(&self, name: &str) -> Result<Vec<ContactResult>>;
    async fn search_friends(&self, user_id: &UserId, name: &str) -> Result<Vec<ContactResult>>;
    async fn is_friend(&self, actor_id: &str) -> Result<bool>;
}

pub struct MissingContactDirectory;

#[async_trait]
impl ContactDirectory for MissingContactDirectory {
    async fn search_actors(&self, _name: &str) -> Result<Vec<ContactResult>> {
        Ok(Vec::new())
    }

    async fn search_friends(&self, _user_id: &UserId, _name: &str) -> Result<Vec<ContactResult>> {
        Ok(Vec::new())
    }

    async fn is_friend(&self, actor_id: &str) -> Result<bool> {
        Err(anyhow!("contact directory unavailable for actor {actor_id}"))
    }
}
