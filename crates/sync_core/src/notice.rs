use std::fmt;

use shared::error::{ApiError, ErrorCode};

use crate::{transport::TransportError, upload::UploadError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeCategory {
    Auth,
    Transport,
    Validation,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeContext {
    LoadChannels,
    LoadMessages,
    SendMessage,
    EditMessage,
    Upload,
    ChannelAction,
    Search,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    category: NoticeCategory,
    context: NoticeContext,
    message: String,
}

impl Notice {
    pub fn from_message(context: NoticeContext, message: impl Into<String>) -> Self {
        let message = message.into();
        let category = classify_message(&message);
        Self {
            category,
            context,
            message,
        }
    }

    pub fn from_error(context: NoticeContext, err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");
        let category = err
            .chain()
            .find_map(|cause| {
                if let Some(api) = cause.downcast_ref::<ApiError>() {
                    return Some(category_for_code(api.code));
                }
                if let Some(transport) = cause.downcast_ref::<TransportError>() {
                    return Some(transport.category());
                }
                if let Some(upload) = cause.downcast_ref::<UploadError>() {
                    return Some(upload.category());
                }
                cause
                    .downcast_ref::<reqwest::Error>()
                    .map(|_| NoticeCategory::Transport)
            })
            .unwrap_or_else(|| classify_message(&message));
        Self {
            category,
            context,
            message,
        }
    }

    pub fn category(&self) -> NoticeCategory {
        self.category
    }

    pub fn context(&self) -> NoticeContext {
        self.context
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn headline(&self) -> &'static str {
        match self.context {
            NoticeContext::LoadChannels => "Failed to load channels",
            NoticeContext::LoadMessages => "Failed to load messages",
            NoticeContext::SendMessage => {
                "We have not been able to send the message. Please try again."
            }
            NoticeContext::EditMessage => {
                "We have not been able to edit the message. Please try again."
            }
            NoticeContext::Upload => "Failed to upload files",
            NoticeContext::ChannelAction => "Channel update failed",
            NoticeContext::Search => "Search failed",
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.headline(), self.message)
    }
}

fn category_for_code(code: ErrorCode) -> NoticeCategory {
    match code {
        ErrorCode::Unauthorized | ErrorCode::Forbidden => NoticeCategory::Auth,
        ErrorCode::Validation | ErrorCode::NotFound => NoticeCategory::Validation,
        ErrorCode::RateLimited | ErrorCode::Internal => NoticeCategory::Transport,
    }
}

fn classify_message(message: &str) -> NoticeCategory {
    let lower = message.to_ascii_lowercase();
    if lower.contains("401")
        || lower.contains("403")
        || lower.contains("unauthorized")
        || lower.contains("forbidden")
        || lower.contains("invalid token")
    {
        NoticeCategory::Auth
    } else if lower.contains("invalid")
        || lower.contains("missing")
        || lower.contains("malformed")
    {
        NoticeCategory::Validation
    } else if lower.contains("timeout")
        || lower.contains("timed out")
        || lower.contains("connection")
        || lower.contains("network")
        || lower.contains("unavailable")
        || lower.contains("websocket")
    {
        NoticeCategory::Transport
    } else {
        NoticeCategory::Unknown
    }
}
