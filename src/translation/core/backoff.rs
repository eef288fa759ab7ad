//! 失败批次的重试退避
//!
//! 失败后等待 `base * 2^(n-1)`（不超过 `max`）再允许下一个批次；成功即复位。
//! 重试次数不设上限，失败永远不会让引擎停止。

use std::time::Duration;

use tokio::time::Instant;

use crate::translation::config::RetryConfig;

#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    failures: u32,
    not_before: Option<Instant>,
}

impl Backoff {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            base: Duration::from_millis(config.base_delay_ms),
            max: Duration::from_millis(config.max_delay_ms),
            failures: 0,
            not_before: None,
        }
    }

    /// 连续失败次数
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// 第 `failures` 次连续失败后的等待时长
    pub fn delay_for(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(failures - 1).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }

    /// 记录一次失败，返回下一次允许发送前的等待时长
    pub fn record_failure(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let delay = self.delay_for(self.failures);
        self.not_before = Some(Instant::now() + delay);
        delay
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
        self.not_before = None;
    }

    /// 退避窗口是否仍未结束
    pub fn is_waiting(&self) -> bool {
        self.remaining().is_some()
    }

    pub fn remaining(&self) -> Option<Duration> {
        let deadline = self.not_before?;
        let now = Instant::now();
        if now < deadline {
            Some(deadline - now)
        } else {
            None
        }
    }
}
