use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_CONFIG_FILE: &str = "chat_sync.toml";
pub const CONFIG_PATH_ENV: &str = "CHAT_SYNC_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub channels_fetch_limit: u32,
    pub messages_fetch_limit: u32,
    pub search_result_limit: u32,
    pub scrolled_up_threshold_px: u32,
    pub pinned_seek_offset_px: u32,
    pub mark_read_settle_delay_ms: u64,
    pub output_channel_capacity: usize,
    pub server_url: Option<String>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            channels_fetch_limit: 20,
            messages_fetch_limit: 20,
            search_result_limit: 3,
            scrolled_up_threshold_px: 200,
            pinned_seek_offset_px: 50,
            mark_read_settle_delay_ms: 100,
            output_channel_capacity: 1024,
            server_url: None,
        }
    }
}

impl SyncSettings {
    pub fn mark_read_settle_delay(&self) -> Duration {
        Duration::from_millis(self.mark_read_settle_delay_ms)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    channels_fetch_limit: Option<u32>,
    messages_fetch_limit: Option<u32>,
    search_result_limit: Option<u32>,
    scrolled_up_threshold_px: Option<u32>,
    pinned_seek_offset_px: Option<u32>,
    mark_read_settle_delay_ms: Option<u64>,
    output_channel_capacity: Option<usize>,
    server_url: Option<String>,
}

/// Defaults, then `chat_sync.toml` (or `$CHAT_SYNC_CONFIG`), then `APP__*`
/// environment variables.
pub fn load_settings() -> Result<SyncSettings, ConfigError> {
    let explicit = std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
    let path = explicit
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    load_settings_from(&path, explicit.is_some(), |key| std::env::var(key).ok())
}

pub fn load_settings_from(
    path: &Path,
    required: bool,
    env: impl Fn(&str) -> Option<String>,
) -> Result<SyncSettings, ConfigError> {
    let mut settings = SyncSettings::default();

    match fs::read_to_string(path) {
        Ok(raw) => {
            let file_cfg: FileSettings =
                toml::from_str(&raw).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?;
            apply_file(&mut settings, file_cfg);
        }
        Err(source) if required || source.kind() != std::io::ErrorKind::NotFound => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            });
        }
        Err(_) => {}
    }

    apply_env(&mut settings, env);
    Ok(settings)
}

fn apply_file(settings: &mut SyncSettings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.channels_fetch_limit {
        settings.channels_fetch_limit = v;
    }
    if let Some(v) = file_cfg.messages_fetch_limit {
        settings.messages_fetch_limit = v;
    }
    if let Some(v) = file_cfg.search_result_limit {
        settings.search_result_limit = v;
    }
    if let Some(v) = file_cfg.scrolled_up_threshold_px {
        settings.scrolled_up_threshold_px = v;
    }
    if let Some(v) = file_cfg.pinned_seek_offset_px {
        settings.pinned_seek_offset_px = v;
    }
    if let Some(v) = file_cfg.mark_read_settle_delay_ms {
        settings.mark_read_settle_delay_ms = v;
    }
    if let Some(v) = file_cfg.output_channel_capacity {
        settings.output_channel_capacity = v;
    }
    if file_cfg.server_url.is_some() {
        settings.server_url = file_cfg.server_url;
    }
}

fn apply_env(settings: &mut SyncSettings, env: impl Fn(&str) -> Option<String>) {
    fn parsed<T: std::str::FromStr>(
        env: &impl Fn(&str) -> Option<String>,
        key: &str,
    ) -> Option<T> {
        let raw = env(key)?;
        match raw.trim().parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(key, value = %raw, "config: ignoring invalid environment override");
                None
            }
        }
    }

    if let Some(v) = parsed(&env, "APP__CHANNELS_FETCH_LIMIT") {
        settings.channels_fetch_limit = v;
    }
    if let Some(v) = parsed(&env, "APP__MESSAGES_FETCH_LIMIT") {
        settings.messages_fetch_limit = v;
    }
    if let Some(v) = parsed(&env, "APP__SEARCH_RESULT_LIMIT") {
        settings.search_result_limit = v;
    }
    if let Some(v) = parsed(&env, "APP__SCROLLED_UP_THRESHOLD_PX") {
        settings.scrolled_up_threshold_px = v;
    }
    if let Some(v) = parsed(&env, "APP__PINNED_SEEK_OFFSET_PX") {
        settings.pinned_seek_offset_px = v;
    }
    if let Some(v) = parsed(&env, "APP__MARK_READ_SETTLE_DELAY_MS") {
        settings.mark_read_settle_delay_ms = v;
    }
    if let Some(v) = parsed(&env, "APP__OUTPUT_CHANNEL_CAPACITY") {
        settings.output_channel_capacity = v;
    }
    if let Some(v) = env("APP__SERVER_URL") {
        settings.server_url = Some(v);
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
