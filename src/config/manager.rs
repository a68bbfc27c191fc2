//! 配置管理器 - 负责处理不同环境下的配置覆盖
//!
//! 该模块提供了配置管理功能，包括：
//! - 加载环境特定配置
//! - `FLARE_CHAT_*` 环境变量覆盖调优参数

use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use toml::Value;
use tracing::warn;

use super::{ChatClientConfig, merge_value};

/// 配置管理器
pub struct ConfigManager;

impl ConfigManager {
    /// 获取当前环境名称
    ///
    /// 从环境变量 FLARE_ENV 获取当前环境名称，
    /// 如果未设置则默认为 "development"
    pub fn get_environment() -> String {
        env::var("FLARE_ENV").unwrap_or_else(|_| "development".to_string())
    }

    /// 根据环境加载特定配置
    ///
    /// 加载 {config_dir}/environments/{environment}.toml 文件中的配置，
    /// 并将其合并到基础配置中；文件不存在时不做任何修改
    pub fn load_environment_config(
        base_config: &mut ChatClientConfig,
        config_dir: &Path,
    ) -> Result<()> {
        let env = Self::get_environment();
        let env_config_path = config_dir.join("environments").join(format!("{env}.toml"));

        if !env_config_path.exists() {
            return Ok(());
        }

        let content = fs::read_to_string(&env_config_path)
            .with_context(|| format!("无法读取环境配置文件: {}", env_config_path.display()))?;
        let overlay: Value = toml::from_str(&content)
            .with_context(|| format!("无效的环境配置格式: {}", env_config_path.display()))?;

        Self::merge_overlay(base_config, overlay)
    }

    /// 将 TOML 覆盖层合并到现有配置
    pub fn merge_overlay(base_config: &mut ChatClientConfig, overlay: Value) -> Result<()> {
        let mut merged =
            Value::try_from(&*base_config).context("failed to serialize base configuration")?;
        merge_value(&mut merged, overlay);
        *base_config = merged
            .try_into()
            .context("invalid configuration after environment overlay")?;
        Ok(())
    }

    /// 使用进程环境变量覆盖配置
    pub fn apply_process_env(config: &mut ChatClientConfig) {
        Self::apply_env_overrides(config, |key| env::var(key).ok());
    }

    /// 使用环境变量覆盖调优参数
    ///
    /// 支持的变量：
    /// - FLARE_CHAT_MAX_ATTEMPTS
    /// - FLARE_CHAT_BASE_DELAY_MS
    /// - FLARE_CHAT_MATCH_WINDOW_MS
    /// - FLARE_CHAT_FRESH_WINDOW_MS
    /// - FLARE_CHAT_WINDOW_LIMIT
    /// - FLARE_CHAT_LOG_LEVEL
    pub fn apply_env_overrides<F>(config: &mut ChatClientConfig, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        override_parsed(&lookup, "FLARE_CHAT_MAX_ATTEMPTS", &mut config.send.max_attempts);
        override_parsed(&lookup, "FLARE_CHAT_BASE_DELAY_MS", &mut config.send.base_delay_ms);
        override_parsed(
            &lookup,
            "FLARE_CHAT_MATCH_WINDOW_MS",
            &mut config.reconcile.match_window_ms,
        );
        override_parsed(
            &lookup,
            "FLARE_CHAT_FRESH_WINDOW_MS",
            &mut config.reconcile.fresh_window_ms,
        );
        override_parsed(&lookup, "FLARE_CHAT_WINDOW_LIMIT", &mut config.room.window_limit);

        if let Some(level) = lookup("FLARE_CHAT_LOG_LEVEL").filter(|v| !v.is_empty()) {
            config.logging.level = level;
        }
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => *target = value,
        Err(_) => warn!(key, value = %raw, "ignoring unparsable environment override"),
    }
}
