//! 进程内模拟网关
//!
//! 测试用的脚本化柜台：请求经通道送入独立工作线程，由工作线程回调
//! 注册的 SPI，与真实柜台一样在另一个线程上送达应答与推送。
//!
//! 行为可配置：认证/登录错误码、静默登录（触发超时路径）、报单的
//! 成交方式（全部成交/仅受理/柜台拒单/交易所拒单）。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::core::{
    BrokerInfo, CapitalInfo, InstrumentCommissionRate, InstrumentInfo, OrderStatus, Ticker,
};
use crate::gateway::{
    AuthenticateRequest, DepthTick, GatewayFactory, LoginRequest, LoginResponse, MdGateway, MdSpi,
    OrderAction, OrderInsert, OrderReturn, PasswordUpdateRequest, PositionField, RspResult,
    TradeReturn, TraderGateway, TraderSpi,
};
use crate::utils::{now_string, product_id};
use crate::Result;

/// 报单处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillMode {
    /// 受理后立即全部成交
    FillAll,
    /// 仅受理，保持排队
    AcceptOnly,
    /// 柜台拒单（无回报建档）
    RejectByServer,
    /// 交易所拒单（建档后打回）
    RejectByExchange,
}

/// 模拟柜台的脚本数据，交易与行情网关共享
#[derive(Default)]
pub struct MockExchangeData {
    /// 合约全集
    pub instruments: Vec<InstrumentInfo>,
    /// 手续费率（可按合约或产品键入）
    pub commission_rates: HashMap<Ticker, InstrumentCommissionRate>,
    /// 持仓查询应答行
    pub positions: Vec<PositionField>,
    /// 资金查询应答
    pub capital: CapitalInfo,
    /// 订阅即推送的初始行情
    pub ticks: HashMap<Ticker, DepthTick>,
}

/// 模拟柜台行为开关
pub struct MockBehavior {
    /// 认证错误码，0 为成功
    pub auth_error_id: AtomicI32,
    /// 登录错误码，0 为成功
    pub login_error_id: AtomicI32,
    /// 不应答登录请求，用于触发超时路径
    pub silent_login: AtomicBool,
    /// 合约查询返回无法识别的记录
    pub malformed_instruments: AtomicBool,
    /// 报单处理方式
    pub fill_mode: Mutex<FillMode>,
}

impl Default for MockBehavior {
    fn default() -> Self {
        Self {
            auth_error_id: AtomicI32::new(0),
            login_error_id: AtomicI32::new(0),
            silent_login: AtomicBool::new(false),
            malformed_instruments: AtomicBool::new(false),
            fill_mode: Mutex::new(FillMode::FillAll),
        }
    }
}

impl MockBehavior {
    /// 设置报单处理方式
    pub fn set_fill_mode(&self, mode: FillMode) {
        *self.fill_mode.lock() = mode;
    }
}

// ============================================================================
// 交易网关
// ============================================================================

enum TraderReq {
    Connect,
    Auth,
    Login,
    Confirm,
    PasswordUpdate,
    Logout,
    QryInstruments,
    QryCommission(String),
    QryPositions,
    QryCapital,
    Insert(OrderInsert),
    Action(OrderAction),
}

struct TraderInner {
    data: Arc<Mutex<MockExchangeData>>,
    behavior: Arc<MockBehavior>,
    spi: Mutex<Option<Arc<dyn TraderSpi>>>,
    front_id: i32,
    session_id: AtomicI32,
    /// 已受理未终结的报单，撤单时用于重建回报字段
    open_orders: Mutex<HashMap<i64, OrderInsert>>,
}

impl TraderInner {
    fn spi(&self) -> Option<Arc<dyn TraderSpi>> {
        self.spi.lock().clone()
    }

    fn order_return(&self, order: &OrderInsert, status: OrderStatus) -> OrderReturn {
        OrderReturn {
            front_id: self.front_id,
            session_id: self.session_id.load(Ordering::SeqCst),
            order_ref: order.order_ref,
            exchange: order.exchange,
            instrument_id: order.instrument_id.clone(),
            open_close: order.open_close,
            direction: order.direction,
            hedge_flag: order.hedge_flag,
            total_volume: order.volume,
            traded_volume: match status {
                OrderStatus::AllTraded => order.volume,
                _ => 0,
            },
            remained_volume: match status {
                OrderStatus::AllTraded => 0,
                _ => order.volume,
            },
            price_type: order.price_type,
            limit_price: order.limit_price,
            time_condition: order.time_in_force.time_condition(),
            status,
            submit_rejected: false,
            status_msg: String::new(),
            time: now_string(),
        }
    }

    fn handle(&self, req: TraderReq) {
        // 模拟网络往返
        std::thread::sleep(Duration::from_millis(1));
        let Some(spi) = self.spi() else { return };
        match req {
            TraderReq::Connect => spi.on_front_connected(),
            TraderReq::Auth => {
                let error_id = self.behavior.auth_error_id.load(Ordering::SeqCst);
                let result = if error_id == 0 {
                    RspResult::ok()
                } else {
                    RspResult::error(error_id, "authenticate rejected")
                };
                spi.on_rsp_authenticate(&result);
            }
            TraderReq::Login => {
                if self.behavior.silent_login.load(Ordering::SeqCst) {
                    return;
                }
                let error_id = self.behavior.login_error_id.load(Ordering::SeqCst);
                if error_id != 0 {
                    spi.on_rsp_user_login(
                        &LoginResponse::default(),
                        &RspResult::error(error_id, "login rejected"),
                    );
                    return;
                }
                let session_id = self.session_id.fetch_add(1, Ordering::SeqCst) + 1;
                let rsp = LoginResponse {
                    front_id: self.front_id,
                    session_id,
                    max_order_ref: 0,
                    trading_day: "20260806".to_string(),
                };
                spi.on_rsp_user_login(&rsp, &RspResult::ok());
            }
            TraderReq::Confirm => spi.on_rsp_settlement_confirm(&RspResult::ok()),
            TraderReq::PasswordUpdate => spi.on_rsp_password_update(&RspResult::ok()),
            TraderReq::Logout => spi.on_rsp_user_logout(&RspResult::ok()),
            TraderReq::QryInstruments => {
                if self.behavior.malformed_instruments.load(Ordering::SeqCst) {
                    spi.on_rsp_qry_instrument(None, true);
                    return;
                }
                let instruments = self.data.lock().instruments.clone();
                let count = instruments.len();
                if count == 0 {
                    spi.on_rsp_qry_instrument(None, true);
                    return;
                }
                for (i, info) in instruments.iter().enumerate() {
                    spi.on_rsp_qry_instrument(Some(info), i + 1 == count);
                }
            }
            TraderReq::QryCommission(ticker) => {
                let rate = {
                    let data = self.data.lock();
                    data.commission_rates
                        .get(&ticker)
                        .or_else(|| data.commission_rates.get(&product_id(&ticker)))
                        .cloned()
                };
                spi.on_rsp_qry_commission_rate(rate.as_ref(), true);
            }
            TraderReq::QryPositions => {
                let positions = self.data.lock().positions.clone();
                let count = positions.len();
                if count == 0 {
                    spi.on_rsp_qry_position(None, true);
                    return;
                }
                for (i, row) in positions.iter().enumerate() {
                    spi.on_rsp_qry_position(Some(row), i + 1 == count);
                }
            }
            TraderReq::QryCapital => {
                let capital = self.data.lock().capital;
                spi.on_rsp_qry_capital(&capital);
            }
            TraderReq::Insert(order) => {
                let mode = *self.behavior.fill_mode.lock();
                if mode == FillMode::RejectByServer {
                    spi.on_rsp_order_insert(&order, &RspResult::error(42, "order rejected"));
                    return;
                }
                if mode == FillMode::RejectByExchange {
                    let mut push = self.order_return(&order, OrderStatus::NoTradeQueueing);
                    push.submit_rejected = true;
                    push.status_msg = "rejected by exchange".to_string();
                    spi.on_rtn_order(&push);
                    return;
                }
                spi.on_rtn_order(&self.order_return(&order, OrderStatus::NoTradeQueueing));
                match mode {
                    FillMode::FillAll => {
                        spi.on_rtn_order(&self.order_return(&order, OrderStatus::AllTraded));
                        spi.on_rtn_trade(&TradeReturn {
                            order_ref: order.order_ref,
                            exchange: order.exchange,
                            instrument_id: order.instrument_id.clone(),
                            open_close: order.open_close,
                            direction: order.direction,
                            hedge_flag: order.hedge_flag,
                            price: order.limit_price,
                            volume: order.volume,
                            time: now_string(),
                        });
                    }
                    FillMode::AcceptOnly => {
                        self.open_orders
                            .lock()
                            .insert(order.order_ref, order.clone());
                    }
                    _ => {}
                }
            }
            TraderReq::Action(action) => {
                let order = self.open_orders.lock().remove(&action.order_ref);
                match order {
                    Some(order) => {
                        spi.on_rtn_order(&self.order_return(&order, OrderStatus::Canceled));
                    }
                    None => log::warn!(
                        "Mock gateway: cancel for unknown order ref {}",
                        action.order_ref
                    ),
                }
            }
        }
    }
}

/// 进程内模拟交易网关
pub struct MockTraderGateway {
    inner: Arc<TraderInner>,
    tx: Option<Sender<TraderReq>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MockTraderGateway {
    pub fn new(data: Arc<Mutex<MockExchangeData>>, behavior: Arc<MockBehavior>) -> Self {
        let inner = Arc::new(TraderInner {
            data,
            behavior,
            spi: Mutex::new(None),
            front_id: 1,
            session_id: AtomicI32::new(0),
            open_orders: Mutex::new(HashMap::new()),
        });
        let (tx, rx): (Sender<TraderReq>, Receiver<TraderReq>) = unbounded();
        let worker_inner = inner.clone();
        let worker = std::thread::spawn(move || {
            while let Ok(req) = rx.recv() {
                worker_inner.handle(req);
            }
        });
        Self {
            inner,
            tx: Some(tx),
            worker: Mutex::new(Some(worker)),
        }
    }

    fn send(&self, req: TraderReq) -> Result<()> {
        if let Some(tx) = &self.tx {
            let _ = tx.send(req);
        }
        Ok(())
    }
}

impl TraderGateway for MockTraderGateway {
    fn connect(&self, _front_addrs: &[String], spi: Arc<dyn TraderSpi>) -> Result<()> {
        *self.inner.spi.lock() = Some(spi);
        self.send(TraderReq::Connect)
    }

    fn req_authenticate(&self, _req: &AuthenticateRequest) -> Result<()> {
        self.send(TraderReq::Auth)
    }

    fn req_user_login(&self, _req: &LoginRequest) -> Result<()> {
        self.send(TraderReq::Login)
    }

    fn req_settlement_confirm(&self) -> Result<()> {
        self.send(TraderReq::Confirm)
    }

    fn req_password_update(&self, _req: &PasswordUpdateRequest) -> Result<()> {
        self.send(TraderReq::PasswordUpdate)
    }

    fn req_user_logout(&self) -> Result<()> {
        self.send(TraderReq::Logout)
    }

    fn req_qry_instruments(&self) -> Result<()> {
        self.send(TraderReq::QryInstruments)
    }

    fn req_qry_commission_rate(&self, instrument_id: &str) -> Result<()> {
        self.send(TraderReq::QryCommission(instrument_id.to_string()))
    }

    fn req_qry_positions(&self) -> Result<()> {
        self.send(TraderReq::QryPositions)
    }

    fn req_qry_capital(&self) -> Result<()> {
        self.send(TraderReq::QryCapital)
    }

    fn req_order_insert(&self, order: &OrderInsert) -> Result<()> {
        self.send(TraderReq::Insert(order.clone()))
    }

    fn req_order_action(&self, action: &OrderAction) -> Result<()> {
        self.send(TraderReq::Action(action.clone()))
    }

    fn release(&self) {
        *self.inner.spi.lock() = None;
    }
}

impl Drop for MockTraderGateway {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
    }
}

// ============================================================================
// 行情网关
// ============================================================================

enum MdReq {
    Connect,
    Login,
    Logout,
    Sub(Vec<Ticker>),
    Unsub(Vec<Ticker>),
    Push(DepthTick),
}

struct MdInner {
    data: Arc<Mutex<MockExchangeData>>,
    spi: Mutex<Option<Arc<dyn MdSpi>>>,
}

impl MdInner {
    fn handle(&self, req: MdReq) {
        std::thread::sleep(Duration::from_millis(1));
        let spi = self.spi.lock().clone();
        let Some(spi) = spi else { return };
        match req {
            MdReq::Connect => spi.on_front_connected(),
            MdReq::Login => spi.on_rsp_user_login(&RspResult::ok()),
            MdReq::Logout => spi.on_rsp_user_logout(&RspResult::ok()),
            MdReq::Sub(tickers) => {
                let count = tickers.len();
                for (i, ticker) in tickers.iter().enumerate() {
                    spi.on_rsp_sub_market_data(ticker, i + 1 == count);
                }
                let data = self.data.lock();
                for ticker in &tickers {
                    if let Some(tick) = data.ticks.get(ticker) {
                        spi.on_rtn_depth_market_data(tick);
                    }
                }
            }
            MdReq::Unsub(tickers) => {
                let count = tickers.len();
                for (i, ticker) in tickers.iter().enumerate() {
                    spi.on_rsp_unsub_market_data(ticker, i + 1 == count);
                }
            }
            MdReq::Push(tick) => spi.on_rtn_depth_market_data(&tick),
        }
    }
}

/// 进程内模拟行情网关
pub struct MockMdGateway {
    inner: Arc<MdInner>,
    tx: Option<Sender<MdReq>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MockMdGateway {
    pub fn new(data: Arc<Mutex<MockExchangeData>>) -> Self {
        let inner = Arc::new(MdInner {
            data,
            spi: Mutex::new(None),
        });
        let (tx, rx): (Sender<MdReq>, Receiver<MdReq>) = unbounded();
        let worker_inner = inner.clone();
        let worker = std::thread::spawn(move || {
            while let Ok(req) = rx.recv() {
                worker_inner.handle(req);
            }
        });
        Self {
            inner,
            tx: Some(tx),
            worker: Mutex::new(Some(worker)),
        }
    }

    fn send(&self, req: MdReq) -> Result<()> {
        if let Some(tx) = &self.tx {
            let _ = tx.send(req);
        }
        Ok(())
    }

    /// 测试注入一笔行情推送
    pub fn push_tick(&self, tick: DepthTick) {
        let _ = self.send(MdReq::Push(tick));
    }
}

impl MdGateway for MockMdGateway {
    fn connect(&self, _front_addrs: &[String], spi: Arc<dyn MdSpi>) -> Result<()> {
        *self.inner.spi.lock() = Some(spi);
        self.send(MdReq::Connect)
    }

    fn req_user_login(&self) -> Result<()> {
        self.send(MdReq::Login)
    }

    fn req_user_logout(&self) -> Result<()> {
        self.send(MdReq::Logout)
    }

    fn subscribe(&self, instrument_ids: &[Ticker]) -> Result<()> {
        self.send(MdReq::Sub(instrument_ids.to_vec()))
    }

    fn unsubscribe(&self, instrument_ids: &[Ticker]) -> Result<()> {
        self.send(MdReq::Unsub(instrument_ids.to_vec()))
    }

    fn release(&self) {
        *self.inner.spi.lock() = None;
    }
}

impl Drop for MockMdGateway {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
    }
}

// ============================================================================
// 工厂
// ============================================================================

/// 模拟网关工厂：所有交易网关与行情网关共享同一份脚本数据与行为开关
pub struct MockGatewayFactory {
    pub data: Arc<Mutex<MockExchangeData>>,
    pub behavior: Arc<MockBehavior>,
}

impl MockGatewayFactory {
    pub fn new(data: MockExchangeData) -> Self {
        Self {
            data: Arc::new(Mutex::new(data)),
            behavior: Arc::new(MockBehavior::default()),
        }
    }
}

impl GatewayFactory for MockGatewayFactory {
    fn create_trader(&self, _broker: &BrokerInfo) -> Result<Arc<dyn TraderGateway>> {
        Ok(Arc::new(MockTraderGateway::new(
            self.data.clone(),
            self.behavior.clone(),
        )))
    }

    fn create_md(&self) -> Result<Arc<dyn MdGateway>> {
        Ok(Arc::new(MockMdGateway::new(self.data.clone())))
    }
}
