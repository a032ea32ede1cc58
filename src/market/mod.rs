//! 行情源
//!
//! 在一条行情连接上管理合约订阅，把网关的原始行情推送归一化成
//! [`MarketDepth`] 深度快照写入共享表。快照表是单写多读结构：仅行情
//! 推送线程写入，交易系统与各账户的灵活订单处理只读消费。
//!
//! 订阅/退订按每批 100 个合约分片发送，逐片等待应答，遵守网关的
//! 报文大小限制。

pub mod recorder;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use crate::account::query_manager::{AsyncQueryManager, QueryCondition};
use crate::core::{ConnectionStatus, MarketDepth, Ohlclvt, Ticker};
use crate::gateway::{DepthTick, MdGateway, MdSpi, RspResult};
use crate::{LoginError, Result, TraderError};

use recorder::DataRecorder;

/// 订阅/退订的分片大小
const SUBSCRIBE_BATCH: usize = 100;

/// 每个合约在一个交易时段内的推送衍生状态
#[derive(Debug, Clone, Copy, Default)]
struct TickSessionState {
    last: f64,
    high: f64,
    low: f64,
    volume: i32,
    turnover: f64,
}

/// 网关缺失字段哨兵值归零
fn sanitize(price: f64) -> f64 {
    if !price.is_finite() || price.abs() >= f64::MAX / 2.0 {
        0.0
    } else {
        price
    }
}

/// 行情源内部状态
struct FeedCore {
    server_addrs: Vec<String>,
    gateway: Arc<dyn MdGateway>,
    status: Mutex<ConnectionStatus>,
    subscribed: Mutex<BTreeSet<Ticker>>,
    /// 共享深度快照表：单写（行情推送线程）多读
    market_data: Arc<DashMap<Ticker, MarketDepth>>,
    session_state: DashMap<Ticker, TickSessionState>,
    login_mgr: AsyncQueryManager,
    logout_mgr: AsyncQueryManager,
    sub_mgr: AsyncQueryManager,
    recorders: RwLock<Vec<Arc<dyn DataRecorder>>>,
}

impl FeedCore {
    /// 原始推送归一化为深度快照
    ///
    /// 开盘价取同一时段上一笔推送的最新价；最高/最低在网关时段高低
    /// 与本笔推断值之间取有效者；量额为相邻推送的增量。
    fn normalize(&self, tick: &DepthTick) -> MarketDepth {
        let prev = self
            .session_state
            .get(&tick.instrument_id)
            .map(|s| *s.value())
            .unwrap_or_default();

        let open = prev.last;
        let close = tick.last_price;
        let high = if tick.highest_price > prev.high {
            tick.highest_price
        } else {
            open.max(close)
        };
        let low = if tick.lowest_price < prev.low {
            tick.lowest_price
        } else {
            open.min(close)
        };
        let volume = tick.volume - prev.volume;
        let turnover = tick.turnover - prev.turnover;

        self.session_state.insert(
            tick.instrument_id.clone(),
            TickSessionState {
                last: close,
                high: tick.highest_price,
                low: tick.lowest_price,
                volume: tick.volume,
                turnover: tick.turnover,
            },
        );

        let day = &tick.action_day;
        let update_time = if day.len() == 8 {
            format!(
                "{}-{}-{} {}.{:03}",
                &day[0..4],
                &day[4..6],
                &day[6..8],
                tick.update_time,
                tick.update_millisec
            )
        } else {
            format!("{} {}.{:03}", day, tick.update_time, tick.update_millisec)
        };

        MarketDepth {
            instrument_id: tick.instrument_id.clone(),
            update_time,
            ohlclvt: Ohlclvt {
                open: sanitize(open),
                high: sanitize(high),
                low: sanitize(low),
                close: sanitize(tick.close_price),
                last: tick.last_price,
                volume,
                turnover,
            },
            settle: sanitize(tick.settlement_price),
            open_interest: tick.open_interest,
            average_price: sanitize(tick.average_price),
            upper_limit: tick.upper_limit,
            lower_limit: tick.lower_limit,
            bid: tick.bid,
            ask: tick.ask,
        }
    }
}

/// 行情事件接收器
struct FeedEventSink {
    core: Arc<FeedCore>,
}

impl MdSpi for FeedEventSink {
    fn on_front_connected(&self) {
        if let Err(e) = self.core.gateway.req_user_login() {
            log::error!("Market data: failed to send login request: {}", e);
        }
    }

    fn on_rsp_user_login(&self, result: &RspResult) {
        if result.is_ok() {
            log::trace!("Market data: log in successful");
            *self.core.status.lock() = ConnectionStatus::Connected;
        } else {
            log::error!(
                "Market data: login failed: [{}] {}",
                result.error_id,
                result.error_msg
            );
        }
        self.core.login_mgr.done(result.is_ok());
    }

    fn on_rsp_user_logout(&self, result: &RspResult) {
        if !result.is_ok() {
            log::error!(
                "Market data: logout failed: [{}] {}",
                result.error_id,
                result.error_msg
            );
        } else {
            log::trace!("Market data: logged out");
        }
        self.core.logout_mgr.done(result.is_ok());
    }

    fn on_rsp_sub_market_data(&self, instrument_id: &str, is_last: bool) {
        self.core
            .subscribed
            .lock()
            .insert(instrument_id.to_string());
        if is_last {
            self.core.sub_mgr.done(true);
        }
    }

    fn on_rsp_unsub_market_data(&self, instrument_id: &str, is_last: bool) {
        self.core.subscribed.lock().remove(instrument_id);
        self.core.market_data.remove(instrument_id);
        if is_last {
            self.core.sub_mgr.done(true);
        }
    }

    fn on_rtn_depth_market_data(&self, tick: &DepthTick) {
        let depth = self.core.normalize(tick);
        for recorder in self.core.recorders.read().iter() {
            recorder.write(&depth);
        }
        self.core
            .market_data
            .insert(depth.instrument_id.clone(), depth);
    }
}

/// 行情源
pub struct MarketDataFeed {
    core: Arc<FeedCore>,
}

impl MarketDataFeed {
    /// 创建行情源并绑定行情网关（不发起连接）
    pub fn new(server_addrs: Vec<String>, gateway: Arc<dyn MdGateway>) -> Self {
        Self {
            core: Arc::new(FeedCore {
                server_addrs,
                gateway,
                status: Mutex::new(ConnectionStatus::Disconnected),
                subscribed: Mutex::new(BTreeSet::new()),
                market_data: Arc::new(DashMap::new()),
                session_state: DashMap::new(),
                login_mgr: AsyncQueryManager::new(Duration::from_secs(5)),
                logout_mgr: AsyncQueryManager::new(Duration::from_secs(2)),
                sub_mgr: AsyncQueryManager::new(Duration::from_secs(2)),
                recorders: RwLock::new(Vec::new()),
            }),
        }
    }

    /// 是否已登录
    pub fn is_logged_in(&self) -> bool {
        *self.core.status.lock() == ConnectionStatus::Connected
    }

    /// 已订阅合约
    pub fn subscribed_tickers(&self) -> BTreeSet<Ticker> {
        self.core.subscribed.lock().clone()
    }

    /// 共享深度快照表句柄
    pub fn market_data(&self) -> Arc<DashMap<Ticker, MarketDepth>> {
        self.core.market_data.clone()
    }

    /// 单个合约的最新深度快照
    pub fn depth(&self, instrument_id: &str) -> Option<MarketDepth> {
        self.core
            .market_data
            .get(instrument_id)
            .map(|d| d.value().clone())
    }

    /// 注册行情记录器，之后每笔归一化推送都会分发给它
    pub fn add_recorder(&self, recorder: Arc<dyn DataRecorder>) {
        self.core.recorders.write().push(recorder);
    }

    /// 登录行情服务器
    pub fn log_in(&self) -> Result<()> {
        let core = self.core.clone();
        let cond = self.core.login_mgr.query(1, move || {
            let sink = Arc::new(FeedEventSink { core: core.clone() });
            if let Err(e) = core.gateway.connect(&core.server_addrs, sink) {
                log::error!("Market data: failed to connect front: {}", e);
            }
        });
        match cond {
            QueryCondition::Succeeded => {
                log::info!("Market data: server login successful");
                Ok(())
            }
            QueryCondition::Timeout => Err(TraderError::Network("Market data".to_string())),
            _ => {
                log::info!("Market data: failed to log in server");
                Err(LoginError::Unknown("Market data".to_string()).into())
            }
        }
    }

    /// 登出行情服务器，失败只记录
    pub fn log_out(&self) {
        if !self.is_logged_in() {
            return;
        }
        let core = self.core.clone();
        let cond = self.core.logout_mgr.query(1, move || {
            if let Err(e) = core.gateway.req_user_logout() {
                log::error!("Market data: failed to send logout request: {}", e);
            }
        });
        if cond != QueryCondition::Succeeded {
            log::warn!("Market data: logout did not complete cleanly ({:?})", cond);
        }
        *self.core.status.lock() = ConnectionStatus::Disconnected;
        log::debug!("Market data: log off market info");
        self.core.gateway.release();
    }

    /// 订阅合约，已在订阅列表中的自动剔除
    pub fn subscribe(&self, tickers: &[Ticker]) -> Result<()> {
        let pending: Vec<Ticker> = {
            let subscribed = self.core.subscribed.lock();
            tickers
                .iter()
                .filter(|t| !subscribed.contains(*t))
                .cloned()
                .collect()
        };
        log::trace!(
            "Market data: asked to subscribe {} tickers, {} not in current subscribe list",
            tickers.len(),
            pending.len()
        );
        for chunk in pending.chunks(SUBSCRIBE_BATCH) {
            let core = self.core.clone();
            let chunk_owned = chunk.to_vec();
            let cond = self.core.sub_mgr.query(1, move || {
                if let Err(e) = core.gateway.subscribe(&chunk_owned) {
                    log::error!("Market data: failed to send subscribe request: {}", e);
                }
            });
            if cond != QueryCondition::Succeeded {
                log::error!("Market data: fail to subscribe tickers");
                return Err(TraderError::Network("Market data".to_string()));
            }
        }
        Ok(())
    }

    /// 退订合约，不在订阅列表中的自动剔除
    pub fn unsubscribe(&self, tickers: &[Ticker]) -> Result<()> {
        let pending: Vec<Ticker> = {
            let subscribed = self.core.subscribed.lock();
            tickers
                .iter()
                .filter(|t| subscribed.contains(*t))
                .cloned()
                .collect()
        };
        log::trace!(
            "Market data: asked to unsubscribe {} tickers, {} in current subscribe list",
            tickers.len(),
            pending.len()
        );
        for chunk in pending.chunks(SUBSCRIBE_BATCH) {
            let core = self.core.clone();
            let chunk_owned = chunk.to_vec();
            let cond = self.core.sub_mgr.query(1, move || {
                if let Err(e) = core.gateway.unsubscribe(&chunk_owned) {
                    log::error!("Market data: failed to send unsubscribe request: {}", e);
                }
            });
            if cond != QueryCondition::Succeeded {
                log::error!("Market data: fail to unsubscribe tickers");
                return Err(TraderError::Network("Market data".to_string()));
            }
        }
        Ok(())
    }
}

impl Drop for MarketDataFeed {
    /// 先退订全部合约再登出，失败只记录
    fn drop(&mut self) {
        if !self.is_logged_in() {
            return;
        }
        let tickers: Vec<Ticker> = self.subscribed_tickers().into_iter().collect();
        if !tickers.is_empty() {
            if let Err(e) = self.unsubscribe(&tickers) {
                log::warn!("Market data: unsubscribe on drop failed: {}", e);
            }
        }
        self.log_out();
    }
}
