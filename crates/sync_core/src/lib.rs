//! Client-side reconciliation engine for channel and message state.

pub mod analytics;
pub mod backend;
pub mod commands;
pub mod config;
pub mod context;
pub mod directory;
pub mod event_bus;
pub mod fixtures;
pub mod memory;
pub mod notice;
pub mod presence;
pub mod scroll;
pub mod search;
pub mod separators;
pub mod session;
pub mod timeline;
pub mod transport;
pub mod unread;
pub mod upload;
pub mod view;

pub use backend::{ContactDirectory, MessagingBackend};
pub use config::{load_settings, SyncSettings};
pub use context::{SessionContext, SessionEvent};
pub use event_bus::EventBus;
pub use memory::InMemoryBackend;
pub use notice::{Notice, NoticeCategory, NoticeContext};
pub use session::{ChatSession, LoginProfile};
pub use transport::{spawn_event_feed, HttpMessagingBackend};
