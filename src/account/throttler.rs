//! 请求限速器
//!
//! 网关对查询类请求有每秒次数限制，所有出站请求路径都经过本限速器。

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// 滑动窗口限速器
///
/// 记录窗口期内最近 `rate` 次调用的时间戳。`wait()` 在未达上限时立即
/// 记录返回；达到上限时阻塞到最早一次调用滑出窗口。`rate <= 0` 时
/// 完全关闭限速。
pub struct RateThrottler {
    rate: i32,
    window: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateThrottler {
    /// 创建限速器: 窗口 `window` 内最多 `rate` 次调用
    pub fn new(rate: i32, window: Duration) -> Self {
        Self {
            rate,
            window,
            calls: Mutex::new(VecDeque::new()),
        }
    }

    /// 申请一次调用额度，必要时阻塞
    pub fn wait(&self) {
        if self.rate <= 0 {
            return;
        }
        let capacity = self.rate as usize;
        let mut calls = self.calls.lock();

        if calls.len() < capacity {
            calls.push_back(Instant::now());
            return;
        }

        let threshold = Instant::now() - self.window;
        while calls.front().is_some_and(|t| *t < threshold) {
            calls.pop_front();
        }
        if calls.len() >= capacity {
            if let Some(oldest) = calls.pop_front() {
                let release_at = oldest + self.window;
                let now = Instant::now();
                if release_at > now {
                    std::thread::sleep(release_at - now);
                }
            }
        }
        calls.push_back(Instant::now());
    }
}
