//! Flare IM Client 配置模块
//!
//! 该模块提供聊天客户端的配置管理功能，包括：
//! - 配置文件加载和解析（单文件或目录合并）
//! - 环境特定配置覆盖
//! - 发送重试、对账窗口、房间订阅等参数定义

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use toml::Value;
use tracing::warn;

use crate::domain::service::MatchWindows;
use crate::error::{ChatError, ChatResult};

mod manager;
pub use manager::ConfigManager;

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub with_target: bool,
    pub with_thread_ids: bool,
    pub with_file: bool,
    pub with_line_number: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            with_target: true,
            with_thread_ids: false,
            with_file: false,
            with_line_number: false,
        }
    }
}

/// 发送重试配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SendConfig {
    /// 单次提交最多持久化次数（含首次）
    pub max_attempts: u32,
    /// 线性退避基数（毫秒）
    pub base_delay_ms: u64,
}

impl Default for SendConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay_ms: 500,
        }
    }
}

/// 对账窗口配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub match_window_ms: i64,
    pub fresh_window_ms: i64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        let windows = MatchWindows::default();
        Self {
            match_window_ms: windows.match_window_ms,
            fresh_window_ms: windows.fresh_window_ms,
        }
    }
}

/// 房间配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// 订阅窗口大小（最近 N 条）
    pub window_limit: usize,
    pub public_room_id: String,
    pub public_title: String,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            window_limit: 25,
            public_room_id: "messages".to_string(),
            public_title: "Public Chat".to_string(),
        }
    }
}

/// 事件通道配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

/// 聊天客户端配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatClientConfig {
    pub send: SendConfig,
    pub reconcile: ReconcileConfig,
    pub room: RoomConfig,
    pub events: EventsConfig,
    pub logging: LoggingConfig,
}

impl ChatClientConfig {
    /// 校验配置
    pub fn validate(&self) -> ChatResult<()> {
        if self.send.max_attempts == 0 {
            return Err(ChatError::Config(
                "send.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.room.window_limit == 0 {
            return Err(ChatError::Config(
                "room.window_limit must be at least 1".to_string(),
            ));
        }
        if self.reconcile.match_window_ms <= 0 || self.reconcile.fresh_window_ms <= 0 {
            return Err(ChatError::Config(
                "reconcile windows must be positive".to_string(),
            ));
        }
        if self.room.public_room_id.is_empty() {
            return Err(ChatError::Config(
                "room.public_room_id must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// 对账时间窗口
    pub fn match_windows(&self) -> MatchWindows {
        MatchWindows {
            match_window_ms: self.reconcile.match_window_ms,
            fresh_window_ms: self.reconcile.fresh_window_ms,
        }
    }
}

/// 解析 TOML 文本
pub fn parse_config(content: &str) -> Result<ChatClientConfig> {
    toml::from_str(content).context("invalid config format")
}

/// 加载配置
///
/// 依次尝试 `path`、`config`、`config.toml`，全部失败时使用默认配置。
/// 随后叠加 `config/environments/{FLARE_ENV}.toml` 与 `FLARE_CHAT_*` 环境变量。
pub fn load_config(path: Option<&str>) -> ChatClientConfig {
    let candidates: Vec<PathBuf> = match path {
        Some(p) => vec![PathBuf::from(p)],
        None => vec![PathBuf::from("config"), PathBuf::from("config.toml")],
    };

    let mut cfg = load_with_fallback(&candidates);
    if let Err(e) = ConfigManager::load_environment_config(&mut cfg, Path::new("config")) {
        warn!("failed to load environment config: {}", e);
    }
    ConfigManager::apply_process_env(&mut cfg);
    cfg
}

/// 加载并校验配置
pub fn load_config_with_validation(path: Option<&str>) -> ChatResult<ChatClientConfig> {
    let cfg = load_config(path);
    cfg.validate()?;
    Ok(cfg)
}

/// 使用备选方案加载配置
fn load_with_fallback(candidates: &[PathBuf]) -> ChatClientConfig {
    for path in candidates {
        match load_config_from_source(path) {
            Ok(cfg) => return cfg,
            Err(err) => {
                warn!("failed to load config from {}: {err}", path.display());
            }
        }
    }

    warn!("no configuration source succeeded, falling back to defaults");
    ChatClientConfig::default()
}

/// 从源加载配置
fn load_config_from_source(path: &Path) -> Result<ChatClientConfig> {
    if !path.exists() {
        return Err(anyhow!(
            "configuration path {} does not exist",
            path.display()
        ));
    }

    let metadata = path
        .metadata()
        .with_context(|| format!("unable to read metadata for {}", path.display()))?;

    if metadata.is_dir() {
        load_config_from_directory(path)
    } else {
        load_config_from_file(path)
    }
}

/// 从文件加载配置
fn load_config_from_file(path: &Path) -> Result<ChatClientConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read config file: {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("invalid config format: {}", path.display()))
}

/// 从目录加载配置：base.toml 之后按文件名顺序合并 overrides/ 下的片段
fn load_config_from_directory(path: &Path) -> Result<ChatClientConfig> {
    let base_file = path.join("base.toml");
    if !base_file.exists() {
        return Err(anyhow!(
            "missing base configuration: {}",
            base_file.display()
        ));
    }

    let mut merged = load_toml_value(&base_file)?;

    if !merged.is_table() {
        return Err(anyhow!(
            "base configuration must be a table: {}",
            base_file.display()
        ));
    }

    merge_directory(&mut merged, &path.join("overrides"))?;

    let cfg: ChatClientConfig = merged
        .try_into()
        .with_context(|| format!("invalid configuration after merging {}", path.display()))?;

    Ok(cfg)
}

/// 合并目录中的配置
fn merge_directory(root: &mut Value, dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }

    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("unable to read config directory {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(OsStr::to_str)
                .map(|ext| ext.eq_ignore_ascii_case("toml"))
                .unwrap_or(false)
        })
        .collect::<Vec<_>>();

    entries.sort_by_key(|entry| entry.path());

    for entry in entries {
        let value = load_toml_value(&entry.path())?;
        merge_value(root, value);
    }

    Ok(())
}

/// 加载 TOML 值
fn load_toml_value(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read config fragment {}", path.display()))?;
    let value: Value = toml::from_str(&content)
        .with_context(|| format!("invalid TOML content in fragment {}", path.display()))?;
    Ok(value)
}

/// 递归合并：表按键合并，其他值直接覆盖
pub(crate) fn merge_value(base: &mut Value, overlay: Value) {
    match overlay {
        Value::Table(overlay_table) => {
            if let Value::Table(base_table) = base {
                for (key, overlay_value) in overlay_table.into_iter() {
                    match base_table.get_mut(&key) {
                        Some(base_value) => merge_value(base_value, overlay_value),
                        None => {
                            base_table.insert(key, overlay_value);
                        }
                    }
                }
            } else {
                *base = Value::Table(overlay_table);
            }
        }
        other => {
            *base = other;
        }
    }
}
