//! 工具函数模块
//!
//! 提供时间差计算与时间格式化等通用工具函数

use chrono::{DateTime, Local, Utc};

/// 计算 `from` 到 `to` 经过的毫秒数（`to` 更早时为负数）
pub fn elapsed_millis(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_milliseconds()
}

/// 格式化为本地 `HH:MM`，用于消息气泡时间
pub fn format_clock_time(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%H:%M").to_string()
}
