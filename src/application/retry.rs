//! 持久化重试策略（线性退避）

use std::time::Duration;

use crate::config::SendConfig;
use crate::error::StoreError;

/// 重试策略配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 单次提交最多发起的持久化次数（含首次）
    pub max_attempts: u32,
    /// 退避基数（毫秒），第 n 次失败后等待 base * n
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay_ms: 500,
        }
    }
}

impl RetryPolicy {
    /// 从配置创建重试策略
    pub fn from_config(config: &SendConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay_ms: config.base_delay_ms,
        }
    }

    /// 第 `attempt` 次失败后的等待时长
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms.saturating_mul(u64::from(attempt)))
    }

    /// 第 `attempt` 次失败后是否自动重试
    pub fn should_retry(&self, attempt: u32, error: &StoreError) -> bool {
        error.is_retryable() && attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.calculate_delay(1), Duration::from_millis(500));
        assert_eq!(policy.calculate_delay(2), Duration::from_millis(1000));
    }

    #[test]
    fn test_should_retry_respects_budget_and_kind() {
        let policy = RetryPolicy::default();
        let transient = StoreError::Transient("timeout".to_string());
        let rejected = StoreError::Rejected("denied".to_string());

        assert!(policy.should_retry(1, &transient));
        assert!(!policy.should_retry(2, &transient));
        assert!(!policy.should_retry(1, &rejected));
    }

    #[test]
    fn test_from_config() {
        let config = SendConfig {
            max_attempts: 4,
            base_delay_ms: 250,
        };
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.calculate_delay(3), Duration::from_millis(750));
    }
}
