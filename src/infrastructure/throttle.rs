//! 生成器调用节流 - 基础设施层
//!
//! 所有并发专题共用一个实例，保证两次生成器调用之间至少间隔 `min_interval`。

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

pub struct GenerationThrottle {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl GenerationThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    /// 不限速
    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO)
    }

    /// 等到允许下一次调用，并记录本次调用时间
    pub async fn acquire(&self) {
        let mut last_call = self.last_call.lock().await;
        if let Some(last) = *last_call {
            let ready_at = last + self.min_interval;
            if ready_at > Instant::now() {
                debug!("生成器节流等待 {:?}", ready_at - Instant::now());
                sleep_until(ready_at).await;
            }
        }
        *last_call = Some(Instant::now());
    }
}
