//! # Prometheus 指标收集模块
//!
//! 聊天客户端发送管线与对账的指标。

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

/// 全局指标注册表
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// 进程内唯一的一组采集器，所有会话共享
static CHAT_CLIENT_METRICS: Lazy<ChatClientMetrics> = Lazy::new(ChatClientMetrics::register);

/// 聊天客户端指标
#[derive(Clone)]
pub struct ChatClientMetrics {
    /// 提交的消息总数
    pub messages_submitted_total: IntCounter,
    /// 持久化调用次数（含重试）
    pub persist_attempts_total: IntCounter,
    /// 自动重试次数
    pub persist_retries_total: IntCounter,
    /// 最终失败次数（按错误类型）
    pub persist_failures_total: IntCounterVec,
    /// 持久化耗时（秒）
    pub persist_duration_seconds: Histogram,
    /// 通过对账淘汰的乐观消息数
    pub pending_reconciled_total: IntCounter,
    /// 当前待确认消息数
    pub pending_queue_depth: IntGauge,
}

impl ChatClientMetrics {
    /// 获取共享采集器的句柄（计数在所有实例间共享）
    pub fn new() -> Self {
        CHAT_CLIENT_METRICS.clone()
    }

    fn register() -> Self {
        let messages_submitted_total = IntCounter::with_opts(Opts::new(
            "chat_messages_submitted_total",
            "Total number of messages submitted by the local user",
        ))
        .expect("Failed to create chat_messages_submitted_total metric");

        let persist_attempts_total = IntCounter::with_opts(Opts::new(
            "chat_persist_attempts_total",
            "Total number of append calls issued to the message store",
        ))
        .expect("Failed to create chat_persist_attempts_total metric");

        let persist_retries_total = IntCounter::with_opts(Opts::new(
            "chat_persist_retries_total",
            "Total number of automatic persistence retries",
        ))
        .expect("Failed to create chat_persist_retries_total metric");

        let persist_failures_total = IntCounterVec::new(
            Opts::new(
                "chat_persist_failures_total",
                "Total number of messages that ended in the failed state",
            ),
            &["kind"],
        )
        .expect("Failed to create chat_persist_failures_total metric");

        let persist_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "chat_persist_duration_seconds",
                "Message store append duration in seconds",
            )
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )
        .expect("Failed to create chat_persist_duration_seconds metric");

        let pending_reconciled_total = IntCounter::with_opts(Opts::new(
            "chat_pending_reconciled_total",
            "Total number of optimistic messages retired by reconciliation",
        ))
        .expect("Failed to create chat_pending_reconciled_total metric");

        let pending_queue_depth = IntGauge::with_opts(Opts::new(
            "chat_pending_queue_depth",
            "Number of optimistic messages awaiting confirmation",
        ))
        .expect("Failed to create chat_pending_queue_depth metric");

        let _ = REGISTRY.register(Box::new(messages_submitted_total.clone()));
        let _ = REGISTRY.register(Box::new(persist_attempts_total.clone()));
        let _ = REGISTRY.register(Box::new(persist_retries_total.clone()));
        let _ = REGISTRY.register(Box::new(persist_failures_total.clone()));
        let _ = REGISTRY.register(Box::new(persist_duration_seconds.clone()));
        let _ = REGISTRY.register(Box::new(pending_reconciled_total.clone()));
        let _ = REGISTRY.register(Box::new(pending_queue_depth.clone()));

        Self {
            messages_submitted_total,
            persist_attempts_total,
            persist_retries_total,
            persist_failures_total,
            persist_duration_seconds,
            pending_reconciled_total,
            pending_queue_depth,
        }
    }
}

impl Default for ChatClientMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// 以文本格式导出全局注册表
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
