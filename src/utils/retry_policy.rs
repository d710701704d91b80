// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::time::Duration;

/// 重试策略配置
///
/// 作业失败重试使用指数退避，获取作业和查找节点使用线性退避
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 初始退避时间
    pub initial_backoff: Duration,
    /// 最大退避时间
    pub max_backoff: Duration,
    /// 退避乘数
    pub backoff_multiplier: f64,
    /// 是否启用指数退避
    pub exponential_backoff: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            exponential_backoff: true,
        }
    }
}

impl RetryPolicy {
    /// 创建指数退避策略
    pub fn exponential(base_ms: u64, cap_ms: u64) -> Self {
        Self {
            initial_backoff: Duration::from_millis(base_ms),
            max_backoff: Duration::from_millis(cap_ms),
            backoff_multiplier: 2.0,
            exponential_backoff: true,
        }
    }

    /// 创建线性退避策略（第 n 次尝试等待 n × unit）
    pub fn linear(unit_ms: u64) -> Self {
        Self {
            initial_backoff: Duration::from_millis(unit_ms),
            max_backoff: Duration::MAX,
            backoff_multiplier: 1.0,
            exponential_backoff: false,
        }
    }

    /// 计算退避时间
    ///
    /// 指数模式下 `attempt` 为已重试次数（从 0 开始），
    /// 返回 `min(base × 2^attempt, cap)`；线性模式下返回 `attempt × base`
    pub fn calculate_backoff(&self, attempt: u32) -> Duration {
        if !self.exponential_backoff {
            return self.initial_backoff.saturating_mul(attempt);
        }

        let backoff_ms = self.initial_backoff.as_millis() as f64
            * self.backoff_multiplier.powi(attempt.min(62) as i32);
        let capped = backoff_ms.min(self.max_backoff.as_millis() as f64);

        Duration::from_millis(capped as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_backoff_exponential() {
        let policy = RetryPolicy::exponential(1_000, 60_000);

        assert_eq!(policy.calculate_backoff(0), Duration::from_secs(1));
        assert_eq!(policy.calculate_backoff(1), Duration::from_secs(2));
        assert_eq!(policy.calculate_backoff(2), Duration::from_secs(4));
    }

    #[test]
    fn test_calculate_backoff_max_limit() {
        let policy = RetryPolicy::exponential(1_000, 60_000);

        assert_eq!(policy.calculate_backoff(6), Duration::from_secs(60));
        assert_eq!(policy.calculate_backoff(40), Duration::from_secs(60));
    }

    #[test]
    fn test_calculate_backoff_linear() {
        let policy = RetryPolicy::linear(100);

        assert_eq!(policy.calculate_backoff(1), Duration::from_millis(100));
        assert_eq!(policy.calculate_backoff(3), Duration::from_millis(300));
    }

    #[test]
    fn test_zero_base_disables_delay() {
        let policy = RetryPolicy::exponential(0, 60_000);
        assert_eq!(policy.calculate_backoff(3), Duration::ZERO);
    }
}
