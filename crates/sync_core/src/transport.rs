use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use shared::{
    domain::{ChannelId, ChannelType, Cid, MemberRole, MessageId, UserId},
    error::ApiError,
    event::ChatEvent,
    protocol::{
        Channel, ChannelPatch, ChatUser, CreateChannelData, FileUpload, FileUploadResponse,
        Message, MessagePatch, SendMessageRequest, UserPatch,
    },
    query::{ChannelFilters, ChannelOptions, ChannelSort, MessagePagination},
};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message as Frame};
use tracing::{debug, info, warn};
use url::Url;

use crate::{backend::MessagingBackend, event_bus::EventBus, notice::NoticeCategory};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("server url must start with http:// or https://: {0}")]
    InvalidUrl(String),
    #[error("failed to connect event feed {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: Box<tokio_tungstenite::tungstenite::Error>,
    },
    #[error("invalid event frame: {0}")]
    Decode(#[from] serde_json::Error),
}

impl TransportError {
    pub fn category(&self) -> NoticeCategory {
        match self {
            TransportError::InvalidUrl(_) => NoticeCategory::Validation,
            TransportError::Connect { .. } | TransportError::Decode(_) => {
                NoticeCategory::Transport
            }
        }
    }
}

#[derive(Serialize)]
struct QueryChannelsRequest<'a> {
    filter_conditions: &'a ChannelFilters,
    sort: &'a ChannelSort,
    #[serde(flatten)]
    options: &'a ChannelOptions,
}

#[derive(Serialize)]
struct CreateChannelRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<ChannelId>,
    data: CreateChannelData,
}

#[derive(Serialize)]
struct RemoveMembersRequest<'a> {
    user_ids: &'a [UserId],
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<SendMessageRequest>,
}

#[derive(Serialize)]
struct ModeratorsRequest<'a> {
    user_ids: &'a [UserId],
}

#[derive(Serialize)]
struct MemberRoleRequest {
    channel_role: &'static str,
}

#[derive(Deserialize)]
struct UnreadResponse {
    unread_count: u32,
}

async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::from_response(status.as_u16(), &body).into())
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    Ok(check(response).await?.json().await?)
}

fn channel_path(cid: &Cid) -> String {
    format!("/channels/{}/{}", cid.channel_type.as_str(), cid.id)
}

pub struct HttpMessagingBackend {
    http: reqwest::Client,
    server_url: String,
    user_id: UserId,
}

impl HttpMessagingBackend {
    pub fn new(server_url: &str, user_id: UserId) -> Result<Self> {
        let parsed = Url::parse(server_url)
            .with_context(|| format!("invalid server url: {server_url}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(TransportError::InvalidUrl(server_url.to_string()).into());
        }
        Ok(Self {
            http: reqwest::Client::new(),
            server_url: server_url.trim_end_matches('/').to_string(),
            user_id,
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.server_url))
            .query(&[("user_id", self.user_id.as_str())])
    }

    async fn upload(&self, cid: &Cid, kind: &str, file: &FileUpload) -> Result<FileUploadResponse> {
        let response = self
            .request(Method::POST, &format!("{}/{kind}", channel_path(cid)))
            .query(&[
                ("filename", file.filename.as_str()),
                (
                    "content_type",
                    file.content_type
                        .as_deref()
                        .unwrap_or("application/octet-stream"),
                ),
            ])
            .body(file.bytes.clone())
            .send()
            .await?;
        decode(response).await
    }

    async fn delete_upload(&self, cid: &Cid, kind: &str, url: &str) -> Result<()> {
        let response = self
            .request(Method::DELETE, &format!("{}/{kind}", channel_path(cid)))
            .query(&[("url", url)])
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn post_empty(&self, path: &str) -> Result<()> {
        check(self.request(Method::POST, path).send().await?).await?;
        Ok(())
    }
}

#[async_trait]
impl MessagingBackend for HttpMessagingBackend {
    async fn current_user(&self) -> Result<ChatUser> {
        decode(self.request(Method::GET, "/users/me").send().await?).await
    }

    async fn partial_update_user(&self, user_id: &UserId, set: UserPatch) -> Result<ChatUser> {
        let response = self
            .request(Method::PATCH, &format!("/users/{user_id}"))
            .json(&set)
            .send()
            .await?;
        decode(response).await
    }

    async fn query_channels(
        &self,
        filters: &ChannelFilters,
        sort: &ChannelSort,
        options: &ChannelOptions,
    ) -> Result<Vec<Channel>> {
        let body = QueryChannelsRequest {
            filter_conditions: filters,
            sort,
            options,
        };
        let response = self
            .request(Method::POST, "/channels/query")
            .json(&body)
            .send()
            .await?;
        decode(response).await
    }

    async fn create_channel(
        &self,
        channel_type: ChannelType,
        id: Option<ChannelId>,
        data: CreateChannelData,
    ) -> Result<Channel> {
        let response = self
            .request(Method::POST, &format!("/channels/{}", channel_type.as_str()))
            .json(&CreateChannelRequest { id, data })
            .send()
            .await?;
        decode(response).await
    }

    async fn watch_channel(&self, cid: &Cid) -> Result<Channel> {
        let response = self
            .request(Method::POST, &format!("{}/watch", channel_path(cid)))
            .send()
            .await?;
        decode(response).await
    }

    async fn query_messages(
        &self,
        cid: &Cid,
        pagination: &MessagePagination,
    ) -> Result<Vec<Message>> {
        let response = self
            .request(Method::GET, &format!("{}/messages", channel_path(cid)))
            .query(pagination)
            .send()
            .await?;
        decode(response).await
    }

    async fn send_message(&self, cid: &Cid, request: SendMessageRequest) -> Result<Message> {
        let response = self
            .request(Method::POST, &format!("{}/message", channel_path(cid)))
            .json(&request)
            .send()
            .await?;
        decode(response).await
    }

    async fn send_file(&self, cid: &Cid, file: &FileUpload) -> Result<FileUploadResponse> {
        self.upload(cid, "file", file).await
    }

    async fn send_image(&self, cid: &Cid, file: &FileUpload) -> Result<FileUploadResponse> {
        self.upload(cid, "image", file).await
    }

    async fn delete_file(&self, cid: &Cid, url: &str) -> Result<()> {
        self.delete_upload(cid, "file", url).await
    }

    async fn delete_image(&self, cid: &Cid, url: &str) -> Result<()> {
        self.delete_upload(cid, "image", url).await
    }

    async fn update_channel_partial(&self, cid: &Cid, set: ChannelPatch) -> Result<Channel> {
        let response = self
            .request(Method::PATCH, &channel_path(cid))
            .json(&set)
            .send()
            .await?;
        decode(response).await
    }

    async fn delete_channel(&self, cid: &Cid) -> Result<()> {
        check(self.request(Method::DELETE, &channel_path(cid)).send().await?).await?;
        Ok(())
    }

    async fn remove_members(
        &self,
        cid: &Cid,
        user_ids: &[UserId],
        message: Option<SendMessageRequest>,
    ) -> Result<()> {
        let response = self
            .request(Method::POST, &format!("{}/members/remove", channel_path(cid)))
            .json(&RemoveMembersRequest { user_ids, message })
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn add_moderators(&self, cid: &Cid, user_ids: &[UserId]) -> Result<()> {
        let response = self
            .request(Method::POST, &format!("{}/moderators", channel_path(cid)))
            .json(&ModeratorsRequest { user_ids })
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn demote_moderators(&self, cid: &Cid, user_ids: &[UserId]) -> Result<()> {
        let response = self
            .request(Method::DELETE, &format!("{}/moderators", channel_path(cid)))
            .json(&ModeratorsRequest { user_ids })
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn update_member_role(
        &self,
        cid: &Cid,
        user_id: &UserId,
        role: MemberRole,
    ) -> Result<()> {
        let response = self
            .request(
                Method::POST,
                &format!("{}/members/{user_id}/role", channel_path(cid)),
            )
            .json(&MemberRoleRequest {
                channel_role: role.as_str(),
            })
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn mark_read(&self, cid: &Cid) -> Result<()> {
        self.post_empty(&format!("{}/read", channel_path(cid))).await
    }

    async fn count_unread(&self, cid: &Cid) -> Result<u32> {
        let response = self
            .request(Method::GET, &format!("{}/unread", channel_path(cid)))
            .send()
            .await?;
        let unread: UnreadResponse = decode(response).await?;
        Ok(unread.unread_count)
    }

    async fn keystroke(&self, cid: &Cid) -> Result<()> {
        self.post_empty(&format!("{}/typing/start", channel_path(cid)))
            .await
    }

    async fn stop_typing(&self, cid: &Cid) -> Result<()> {
        self.post_empty(&format!("{}/typing/stop", channel_path(cid)))
            .await
    }

    async fn partial_update_message(&self, id: &MessageId, set: MessagePatch) -> Result<Message> {
        let response = self
            .request(Method::PATCH, &format!("/messages/{id}"))
            .json(&set)
            .send()
            .await?;
        decode(response).await
    }

    async fn delete_message(&self, id: &MessageId) -> Result<Message> {
        let response = self
            .request(Method::DELETE, &format!("/messages/{id}"))
            .send()
            .await?;
        decode(response).await
    }

    async fn pin_message(&self, id: &MessageId) -> Result<Message> {
        let response = self
            .request(Method::POST, &format!("/messages/{id}/pin"))
            .send()
            .await?;
        decode(response).await
    }

    async fn unpin_message(&self, id: &MessageId) -> Result<Message> {
        let response = self
            .request(Method::DELETE, &format!("/messages/{id}/pin"))
            .send()
            .await?;
        decode(response).await
    }
}

pub fn event_feed_url(server_url: &str, user_id: &UserId) -> Result<String, TransportError> {
    let ws_url = if server_url.starts_with("https://") {
        server_url.replacen("https://", "wss://", 1)
    } else if server_url.starts_with("http://") {
        server_url.replacen("http://", "ws://", 1)
    } else {
        return Err(TransportError::InvalidUrl(server_url.to_string()));
    };
    Ok(format!(
        "{}/events?user_id={user_id}",
        ws_url.trim_end_matches('/')
    ))
}

/// Connects the push feed and republishes every decoded event on `bus`.
/// The task ends when the server closes the socket or the read fails; no
/// reconnect is attempted.
pub async fn spawn_event_feed(
    server_url: &str,
    user_id: &UserId,
    bus: EventBus,
) -> Result<JoinHandle<()>> {
    let ws_url = event_feed_url(server_url, user_id)?;
    let (ws_stream, _) = connect_async(&ws_url)
        .await
        .map_err(|source| TransportError::Connect {
            url: ws_url.clone(),
            source: Box::new(source),
        })?;
    let (_, mut ws_reader) = ws_stream.split();
    info!(url = %ws_url, "transport: event feed connected");

    Ok(tokio::spawn(async move {
        while let Some(frame) = ws_reader.next().await {
            match frame {
                Ok(Frame::Text(text)) => match serde_json::from_str::<ChatEvent>(&text) {
                    Ok(event) => {
                        let delivered = bus.publish(&event);
                        debug!(kind = %event.kind, delivered, "transport: event received");
                    }
                    Err(err) => {
                        warn!(error = %TransportError::Decode(err), "transport: frame dropped");
                    }
                },
                Ok(Frame::Close(_)) => break,
                Ok(_) => {}
                Err(err) => {
                    warn!(error = %err, "transport: event feed receive failed");
                    break;
                }
            }
        }
        info!("transport: event feed closed");
    }))
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
