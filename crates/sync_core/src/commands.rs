use anyhow::{anyhow, Result};
use shared::{
    domain::{ChannelId, ChannelType, Cid, MemberRole, MessageId, UserId},
    protocol::{
        Attachment, Channel, ChannelPatch, CreateChannelData, FileUpload, Message, MessagePatch,
        SendMessageRequest,
    },
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    analytics::{AnalyticsEvent, ChatType},
    context::SessionContext,
    notice::{Notice, NoticeContext},
    presence,
    upload::UploadOutcome,
};

pub const GROUP_CREATED_TEXT: &str = "Group chat created";
pub const PRIVATE_CREATED_TEXT: &str = "Private chat created";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupDetails {
    pub name: String,
    pub description: String,
    pub image: Option<String>,
}

fn report_upload_failure(ctx: &SessionContext, outcome: &mut UploadOutcome) {
    if let Some(err) = outcome.error.take() {
        ctx.notify(Notice::from_error(NoticeContext::Upload, &anyhow::Error::new(err)));
    }
}

pub async fn send_message(
    ctx: &SessionContext,
    channel: &Channel,
    text: &str,
    files: &[FileUpload],
    correlation: Option<MessageId>,
) -> Result<Option<Message>> {
    if text.is_empty() && files.is_empty() {
        return Ok(None);
    }
    let mut upload = ctx.uploader.upload_files(&channel.cid, files).await;
    report_upload_failure(ctx, &mut upload);
    if text.is_empty() && upload.attachments.is_empty() {
        return Ok(None);
    }
    let request = SendMessageRequest {
        id: correlation,
        text: text.to_string(),
        attachments: upload.attachments,
        ..SendMessageRequest::default()
    };
    let message = ctx.backend.send_message(&channel.cid, request).await?;
    ctx.record(
        AnalyticsEvent::ChatMessageSent,
        &channel.cid,
        "memberId",
        Some(ChatType::of(channel.is_group())),
    );
    info!(cid = %channel.cid, id = %message.id, "commands: message sent");
    Ok(Some(message))
}

pub fn removed_attachments(original: &Message, kept: &[Attachment]) -> Vec<Attachment> {
    original
        .attachments
        .iter()
        .filter(|attachment| !attachment.is_link_preview())
        .filter(|attachment| !kept.contains(attachment))
        .cloned()
        .collect()
}

pub fn edit_patch(text: &str, kept: &[Attachment], uploaded: Vec<Attachment>) -> MessagePatch {
    let mut attachments = kept.to_vec();
    attachments.extend(uploaded);
    MessagePatch {
        text: Some(text.to_string()),
        attachments: Some(attachments),
        edited: Some(true),
    }
}

pub async fn edit_message(
    ctx: &SessionContext,
    cid: &Cid,
    original: &Message,
    text: &str,
    new_files: &[FileUpload],
    kept: &[Attachment],
) -> Result<Message> {
    let mut upload = ctx.uploader.upload_files(cid, new_files).await;
    report_upload_failure(ctx, &mut upload);
    for attachment in removed_attachments(original, kept) {
        ctx.uploader.delete_remote(cid, &attachment).await;
    }
    let patch = edit_patch(text, kept, upload.attachments);
    let message = ctx
        .backend
        .partial_update_message(&original.id, patch)
        .await?;
    info!(%cid, id = %message.id, "commands: message edited");
    Ok(message)
}

pub async fn delete_message(ctx: &SessionContext, cid: &Cid, message: &Message) -> Result<Message> {
    for attachment in &message.attachments {
        ctx.uploader.delete_remote(cid, attachment).await;
    }
    let deleted = ctx.backend.delete_message(&message.id).await?;
    info!(%cid, id = %message.id, "commands: message deleted");
    Ok(deleted)
}

pub async fn toggle_pin(ctx: &SessionContext, channel: &Channel, message: &Message) -> Result<()> {
    if let Some(current) = channel.state.pinned_messages.first() {
        ctx.backend.unpin_message(&current.id).await?;
    }
    if !message.pinned {
        ctx.backend.pin_message(&message.id).await?;
    }
    Ok(())
}

pub async fn create_group_channel(ctx: &SessionContext, details: GroupDetails) -> Result<Channel> {
    let me = ctx.user().id.clone();
    let id = ChannelId::new(Uuid::new_v4().to_string());
    let data = CreateChannelData {
        members: vec![me.clone()],
        name: Some(details.name),
        description: Some(details.description),
        image: details.image,
        is_group: Some(true),
        unavailable_for_actors: None,
    };
    let created = ctx
        .backend
        .create_channel(ChannelType::Messaging, Some(id), data)
        .await?;
    let channel = ctx.backend.watch_channel(&created.cid).await?;
    ctx.backend
        .send_message(&channel.cid, SendMessageRequest::system(GROUP_CREATED_TEXT, true))
        .await?;
    ctx.record(
        AnalyticsEvent::ChatCreated,
        &channel.cid,
        "creatorId",
        Some(ChatType::Group),
    );
    ctx.backend.add_moderators(&channel.cid, &[me]).await?;
    info!(cid = %channel.cid, "commands: group channel created");
    Ok(channel)
}

pub async fn update_group_channel(
    ctx: &SessionContext,
    cid: &Cid,
    patch: ChannelPatch,
) -> Result<Channel> {
    ctx.backend.update_channel_partial(cid, patch).await
}

pub async fn delete_channel(ctx: &SessionContext, cid: &Cid) -> Result<()> {
    ctx.backend.delete_channel(cid).await?;
    info!(%cid, "commands: channel deleted");
    Ok(())
}

pub async fn leave_channel(ctx: &SessionContext, cid: &Cid) -> Result<()> {
    let me = ctx.user();
    let farewell = SendMessageRequest::system(format!("{} left the channel", me.name), false);
    ctx.backend
        .remove_members(cid, &[me.id.clone()], Some(farewell))
        .await?;
    ctx.record(AnalyticsEvent::ChatLeft, cid, "memberId", None);
    info!(%cid, "commands: left channel");
    Ok(())
}

/// Flips whether actors may reply: the companion's member role first, then
/// the channel flag. Both calls are issued even if the first fails; the
/// first failure is returned.
pub async fn toggle_availability(ctx: &SessionContext, channel: &Channel) -> Result<()> {
    let viewer = &ctx.user().id;
    let companion = presence::private_companion(channel, viewer)
        .map(|member| member.user.id.clone())
        .ok_or_else(|| anyhow!("channel {} has no companion", channel.cid))?;
    let unavailable = !presence::is_channel_enabled_for_actors(channel, viewer);
    let role = if unavailable {
        MemberRole::Member
    } else {
        MemberRole::DisabledActor
    };

    let role_result = ctx
        .backend
        .update_member_role(&channel.cid, &companion, role)
        .await;
    if let Err(err) = &role_result {
        warn!(cid = %channel.cid, error = %err, "commands: member role update failed");
    }
    let patch = ChannelPatch {
        unavailable_for_actors: Some(!unavailable),
        ..ChannelPatch::default()
    };
    let flag_result = ctx.backend.update_channel_partial(&channel.cid, patch).await;
    if let Err(err) = &flag_result {
        warn!(cid = %channel.cid, error = %err, "commands: availability flag update failed");
    }
    role_result?;
    flag_result.map(|_| ())
}

pub async fn create_private_channel(ctx: &SessionContext, companion: &UserId) -> Result<Channel> {
    let data = CreateChannelData {
        members: vec![ctx.user().id.clone(), companion.clone()],
        unavailable_for_actors: Some(false),
        ..CreateChannelData::default()
    };
    let created = ctx
        .backend
        .create_channel(ChannelType::Messaging, None, data)
        .await?;
    let channel = ctx.backend.watch_channel(&created.cid).await?;
    ctx.backend
        .send_message(&channel.cid, SendMessageRequest::system(PRIVATE_CREATED_TEXT, true))
        .await?;
    ctx.record(
        AnalyticsEvent::ChatCreated,
        &channel.cid,
        "creatorId",
        Some(ChatType::Private),
    );
    info!(cid = %channel.cid, "commands: private channel created");
    Ok(channel)
}

pub async fn add_moderators(ctx: &SessionContext, cid: &Cid, user_ids: &[UserId]) -> Result<()> {
    ctx.backend.add_moderators(cid, user_ids).await
}

pub async fn demote_moderators(ctx: &SessionContext, cid: &Cid, user_ids: &[UserId]) -> Result<()> {
    ctx.backend.demote_moderators(cid, user_ids).await
}

#[cfg(test)]
#[path = "tests/commands_tests.rs"]
mod tests;
