//! 异步请求同步化
//!
//! 网关接口是"发请求 + 回调应答"的异步协议，交易账户的同步操作
//! 通过本模块把调用线程挂在条件变量上，等待回调线程 `done()` 放行，
//! 支持超时与有限次重试。

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// 查询状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryCondition {
    /// 回调报告失败
    Failed,
    /// 尚未发起过请求
    Initialized,
    /// 请求已发出，等待回调
    OnGoing,
    /// 等待超时
    Timeout,
    /// 回调报告成功
    Succeeded,
}

/// 异步查询管理器
///
/// 一个实例服务一条逻辑请求线。调用线程在 `query` 内持有状态锁直到
/// 进入等待，天然串行化同一实例上的并发调用；每次发起请求前状态被
/// 重置为 `OnGoing`，迟到的 `done()` 只会落在已结束的状态上，无害。
pub struct AsyncQueryManager {
    timeout: Duration,
    retry_delay: Duration,
    state: Mutex<QueryCondition>,
    cv: Condvar,
}

impl AsyncQueryManager {
    /// 创建管理器，重试间隔为 0
    pub fn new(timeout: Duration) -> Self {
        Self::with_retry_delay(timeout, Duration::ZERO)
    }

    /// 创建管理器并指定重试间隔
    pub fn with_retry_delay(timeout: Duration, retry_delay: Duration) -> Self {
        Self {
            timeout,
            retry_delay,
            state: Mutex::new(QueryCondition::Initialized),
            cv: Condvar::new(),
        }
    }

    /// 当前状态
    pub fn condition(&self) -> QueryCondition {
        *self.state.lock()
    }

    /// 发起请求并阻塞等待回调
    ///
    /// 每次尝试：置状态 `OnGoing`，执行 `action`（应恰好触发一次异步
    /// 网关请求），等待 `done()` 或超时。成功立即返回；超时或失败时，
    /// 若还有尝试额度则等待重试间隔后重发，耗尽后返回最后一次状态。
    pub fn query<F>(&self, max_attempts: u32, mut action: F) -> QueryCondition
    where
        F: FnMut(),
    {
        let mut last = self.condition();
        for attempt in 0..max_attempts {
            {
                let mut state = self.state.lock();
                *state = QueryCondition::OnGoing;
                action();
                let wait = self
                    .cv
                    .wait_while_for(&mut state, |s| *s == QueryCondition::OnGoing, self.timeout);
                if wait.timed_out() && *state == QueryCondition::OnGoing {
                    *state = QueryCondition::Timeout;
                }
                last = *state;
            }
            if last == QueryCondition::Succeeded {
                return last;
            }
            if attempt + 1 < max_attempts && !self.retry_delay.is_zero() {
                std::thread::sleep(self.retry_delay);
            }
        }
        last
    }

    /// 回调线程放行等待者
    ///
    /// 没有等待者时调用也安全；信号不会丢失，因为下一次 `query`
    /// 在发请求前总会重置状态。
    pub fn done(&self, success: bool) {
        let mut state = self.state.lock();
        *state = if success {
            QueryCondition::Succeeded
        } else {
            QueryCondition::Failed
        };
        self.cv.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    /// 超时前回调成功，第一次尝试即返回 Succeeded
    #[test]
    fn test_query_succeeds_on_first_attempt() {
        let mgr = Arc::new(AsyncQueryManager::new(Duration::from_secs(2)));

        let mgr_cb = mgr.clone();
        let cond = mgr.query(3, move || {
            let mgr_cb = mgr_cb.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                mgr_cb.done(true);
            });
        });

        assert_eq!(cond, QueryCondition::Succeeded);
    }

    /// 回调永不到达时，恰好尝试 max_attempts 次后返回 Timeout
    #[test]
    fn test_query_times_out_after_max_attempts() {
        let mgr = AsyncQueryManager::with_retry_delay(
            Duration::from_millis(30),
            Duration::from_millis(20),
        );
        let attempts = AtomicU32::new(0);

        let start = Instant::now();
        let cond = mgr.query(3, || {
            attempts.fetch_add(1, Ordering::SeqCst);
        });
        let elapsed = start.elapsed();

        assert_eq!(cond, QueryCondition::Timeout);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        // 3 次超时 + 2 次重试间隔
        assert!(elapsed >= Duration::from_millis(3 * 30 + 2 * 20));
    }

    /// 回调报告失败后重试，第二次成功
    #[test]
    fn test_query_retries_after_failure() {
        let mgr = Arc::new(AsyncQueryManager::new(Duration::from_secs(2)));
        let attempts = Arc::new(AtomicU32::new(0));

        let mgr_cb = mgr.clone();
        let attempts_cb = attempts.clone();
        let cond = mgr.query(2, move || {
            let n = attempts_cb.fetch_add(1, Ordering::SeqCst);
            let mgr_cb = mgr_cb.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(10));
                mgr_cb.done(n > 0);
            });
        });

        assert_eq!(cond, QueryCondition::Succeeded);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    /// 无等待者时调用 done 不会出错
    #[test]
    fn test_done_without_waiter_is_harmless() {
        let mgr = AsyncQueryManager::new(Duration::from_millis(10));
        mgr.done(true);
        assert_eq!(mgr.condition(), QueryCondition::Succeeded);
        mgr.done(false);
        assert_eq!(mgr.condition(), QueryCondition::Failed);
    }
}
